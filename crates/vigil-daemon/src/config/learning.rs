use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub min_evidence: u64,
    pub ema_alpha: f64,
    pub decay: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            min_evidence: 5,
            ema_alpha: 0.3,
            decay: 0.98,
        }
    }
}
