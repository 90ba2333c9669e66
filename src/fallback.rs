use rand::Rng;
use rand::seq::SliceRandom;
use std::path::Path;

use crate::models::{Artifact, ArtifactsResponse};

// Built-in pool: 8x8 solid PNGs (red, green, blue, yellow)
const BUILTIN_IMAGES: [&str; 4] = [
    "iVBORw0KGgoAAAANSUhEUgAAAAgAAAAICAIAAABLbSncAAAAEUlEQVR4nGN47mODFTEMLQkABKRbwUMVVV4AAAAASUVORK5CYII=",
    "iVBORw0KGgoAAAANSUhEUgAAAAgAAAAICAIAAABLbSncAAAAEUlEQVR4nGPQO1OIFTEMLQkAZRVaweOB+WcAAAAASUVORK5CYII=",
    "iVBORw0KGgoAAAANSUhEUgAAAAgAAAAICAIAAABLbSncAAAAEUlEQVR4nGMwmXEbK2IYWhIAKG9pwWohdHUAAAAASUVORK5CYII=",
    "iVBORw0KGgoAAAANSUhEUgAAAAgAAAAICAIAAABLbSncAAAAEUlEQVR4nGP4eIQfK2IYWhIAX9xxAazFPJ8AAAAASUVORK5CYII=",
];

#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("cannot read fallback file: {0}")]
    Io(#[from] std::io::Error),

    #[error("fallback file is not a JSON array of strings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("fallback pool is empty")]
    Empty,
}

// Fixed pool of pre-encoded images served instead of calling upstream
#[derive(Debug, Clone)]
pub struct FallbackPool {
    images: Vec<String>,
}

impl Default for FallbackPool {
    fn default() -> Self {
        Self {
            images: BUILTIN_IMAGES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FallbackPool {
    pub fn new(images: Vec<String>) -> Result<Self, FallbackError> {
        if images.is_empty() {
            return Err(FallbackError::Empty);
        }
        Ok(Self { images })
    }

    // Load a JSON array of base64 strings
    pub fn from_file(path: &Path) -> Result<Self, FallbackError> {
        let raw = std::fs::read(path)?;
        let images: Vec<String> = serde_json::from_slice(&raw)?;
        Self::new(images)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn pick(&self) -> ArtifactsResponse {
        self.pick_with(&mut rand::thread_rng())
    }

    pub fn pick_with<R: Rng + ?Sized>(&self, rng: &mut R) -> ArtifactsResponse {
        // never empty, see new()
        let image = self.images.choose(rng).cloned().unwrap_or_default();
        ArtifactsResponse {
            artifacts: vec![Artifact { base64: image }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    #[test]
    fn selection_is_uniform_over_the_pool() {
        let pool = FallbackPool::default();
        let mut rng = StdRng::seed_from_u64(7);
        let draws = 40_000;

        let mut seen: HashMap<String, usize> = HashMap::new();
        for _ in 0..draws {
            let picked = pool.pick_with(&mut rng);
            *seen.entry(picked.artifacts[0].base64.clone()).or_default() += 1;
        }

        assert_eq!(seen.len(), pool.len());
        let expected = draws / pool.len();
        for (image, count) in seen {
            let skew = count.abs_diff(expected);
            // ~6 standard deviations for n=40000, p=0.25
            assert!(skew < 550, "{} drawn {} times, expected ~{}", &image[..16], count, expected);
        }
    }

    #[test]
    fn envelope_holds_exactly_one_artifact() {
        let json = serde_json::to_value(FallbackPool::default().pick()).unwrap();
        let artifacts = json["artifacts"].as_array().unwrap();

        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0]["base64"].as_str().unwrap().starts_with("iVBORw0KGgo"));
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(matches!(FallbackPool::new(vec![]), Err(FallbackError::Empty)));
    }
}
