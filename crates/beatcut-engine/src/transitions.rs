//! Transition planning between adjacent shots.

use beatcut_models::{Shot, TagField, Transition, TransitionKind};
use rand::Rng;
use tracing::debug;

use crate::config::TransitionConfig;
use crate::error::AssemblyResult;
use crate::similarity::{tag_similarity, TextSimilarity};

/// Chooses a transition from scene and mood similarity.
///
/// Rules, first match wins:
/// 1. distinct scenes: random slide or zoom
/// 2. related scenes: crossfade
/// 3. same scene, mood shift: fade-to-black into sad shots, glitch otherwise
/// 4. otherwise: cut
#[derive(Debug, Clone, Default)]
pub struct TransitionPlanner {
    config: TransitionConfig,
}

impl TransitionPlanner {
    pub fn new(config: TransitionConfig) -> Self {
        Self { config }
    }

    /// Decide one transition from precomputed similarities.
    pub fn decide<R: Rng>(
        &self,
        scene_sim: f64,
        mood_sim: f64,
        next_mood: &str,
        rng: &mut R,
    ) -> Transition {
        let c = &self.config;

        if scene_sim < c.distinct_scene_below {
            let pick = TransitionKind::SCENE_CHANGE[rng.random_range(0..TransitionKind::SCENE_CHANGE.len())];
            Transition::new(pick, c.slide_secs)
        } else if scene_sim < c.similar_scene_from {
            Transition::new(TransitionKind::Crossfade, c.crossfade_secs)
        } else if mood_sim < c.mood_shift_below {
            let sad = next_mood
                .to_lowercase()
                .contains(&c.sad_token.to_lowercase());
            let kind = if sad {
                TransitionKind::FadeBlack
            } else {
                TransitionKind::Glitch
            };
            Transition::new(kind, c.mood_secs)
        } else {
            Transition::cut()
        }
    }

    /// Plan the `len - 1` transitions of a shot list, in order.
    pub async fn plan<R: Rng>(
        &self,
        shots: &[Shot],
        scorer: &dyn TextSimilarity,
        rng: &mut R,
    ) -> AssemblyResult<Vec<Transition>> {
        let mut transitions = Vec::with_capacity(shots.len().saturating_sub(1));

        for (i, pair) in shots.windows(2).enumerate() {
            let (cur, next) = (&pair[0], &pair[1]);
            let scene_sim = tag_similarity(scorer, &cur.tags, &next.tags, TagField::Scene).await?;
            let mood_sim = tag_similarity(scorer, &cur.tags, &next.tags, TagField::Mood).await?;

            let transition = self.decide(scene_sim, mood_sim, next.tags.comparable(TagField::Mood), rng);
            debug!(
                pair = i,
                scene_sim = format!("{:.2}", scene_sim),
                mood_sim = format!("{:.2}", mood_sim),
                kind = %transition.kind,
                duration = transition.duration,
                "Transition planned"
            );
            transitions.push(transition);
        }

        Ok(transitions)
    }
}
