//! Image-bake pipeline catalog: pure evaluation of a bake request against
//! a pipeline's provisioner ordering and region allowlist.
//!
//! Grounded on `mc_rollout::plan`'s `Allowed`/`blocked_reason` result shape,
//! reused here for a non-wave pure evaluator.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provisioner {
    pub kind: String,
    pub script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakePipeline {
    pub id: String,
    pub name: String,
    pub base_image: String,
    pub provisioners: Vec<Provisioner>,
    pub target_regions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateBakePipeline {
    pub name: String,
    pub base_image: String,
    pub provisioners: Vec<Provisioner>,
    pub target_regions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BakeRequest {
    pub region: String,
    /// The provisioner kinds the caller intends to run, in order.
    pub provisioner_kinds: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub allowed: bool,
    pub blocked_reason: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error("bake pipeline must have at least one provisioner")]
    NoProvisioners,
    #[error("bake pipeline must target at least one region")]
    NoTargetRegions,
    #[error("bake pipeline not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, BakeError>;

pub struct BakePipelineCatalog {
    pipelines: RwLock<HashMap<String, BakePipeline>>,
    clock: std::sync::Arc<dyn Clock>,
    ids: IdGenerator,
}

impl BakePipelineCatalog {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            pipelines: RwLock::new(HashMap::new()),
            clock,
            ids: IdGenerator::new("bake"),
        }
    }

    pub fn create(&self, input: CreateBakePipeline) -> Result<BakePipeline> {
        if input.provisioners.is_empty() {
            return Err(BakeError::NoProvisioners);
        }
        if input.target_regions.is_empty() {
            return Err(BakeError::NoTargetRegions);
        }

        let pipeline = BakePipeline {
            id: self.ids.next(),
            name: input.name,
            base_image: input.base_image,
            provisioners: input.provisioners,
            target_regions: input.target_regions,
            created_at: self.clock.now(),
        };
        self.pipelines.write().expect("pipelines lock poisoned").insert(pipeline.id.clone(), pipeline.clone());
        Ok(pipeline)
    }

    pub fn get(&self, id: &str) -> Option<BakePipeline> {
        self.pipelines.read().expect("pipelines lock poisoned").get(id).cloned()
    }

    pub fn evaluate(&self, pipeline_id: &str, request: &BakeRequest) -> Result<Plan> {
        let pipelines = self.pipelines.read().expect("pipelines lock poisoned");
        let pipeline = pipelines.get(pipeline_id).ok_or_else(|| BakeError::NotFound(pipeline_id.to_string()))?;

        if !pipeline.target_regions.iter().any(|r| r == &request.region) {
            return Ok(Plan {
                allowed: false,
                blocked_reason: Some(format!("region {} is not in the pipeline's target regions", request.region)),
            });
        }

        let expected: Vec<&str> = pipeline.provisioners.iter().map(|p| p.kind.as_str()).collect();
        let requested: Vec<&str> = request.provisioner_kinds.iter().map(|k| k.as_str()).collect();
        if requested != expected {
            return Ok(Plan {
                allowed: false,
                blocked_reason: Some("requested provisioner ordering does not match the pipeline".to_string()),
            });
        }

        Ok(Plan { allowed: true, blocked_reason: None })
    }
}
