use anyhow::{Context, Result};
use config::{Config, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::showset::StageName;
use crate::versioning::VersionScheme;
use crate::workflow::orchestrator::{DEFAULT_ATTACHMENT_BUCKET, DEFAULT_MAX_ATTACHMENT_BYTES};
use crate::workflow::{
    CascadePolicy, ExplicitAdminLock, ImplicitCompletionLock, LockPolicy, LockReleaseCascade,
    OrchestratorSettings, ReworkCascade, StageRules,
};

pub const DEFAULT_ID_PATTERN: &str = r"^[A-Z]{2,4}-[0-9]{3,5}[A-Z]?$";

/// Main configuration structure for the ShowSet workflow engine
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Stage, cascade and lock rules
    pub workflow: WorkflowRulesConfig,
    /// Attachment upload settings
    pub attachments: AttachmentConfig,
    /// ShowSet persistence
    pub store: StoreConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicyKind {
    /// Reopening a complete stage flags completed downstream stages
    Rework,
    /// The first rework after an unlock resets and bumps everything downstream
    LockRelease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicyKind {
    Explicit,
    Implicit,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowRulesConfig {
    pub cascade_policy: CascadePolicyKind,
    pub lock_policy: LockPolicyKind,
    pub version_scheme: VersionScheme,
    /// Stages that accept a direct move to revision_required
    pub revision_eligible_stages: Vec<StageName>,
    /// Regex every new ShowSet id must match; empty disables the check
    pub show_set_id_pattern: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AttachmentConfig {
    /// Bucket scope handed to the upload signer
    pub bucket: String,
    /// Base URL the local signer issues upload URLs against
    pub base_url: String,
    /// Lifetime of an upload handle
    pub upload_expiry_seconds: i64,
    /// Largest accepted declared size
    pub max_size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory for the file backend
    pub directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            workflow: WorkflowRulesConfig {
                cascade_policy: CascadePolicyKind::Rework,
                lock_policy: LockPolicyKind::Explicit,
                version_scheme: VersionScheme::PerStage,
                revision_eligible_stages: StageRules::default()
                    .revision_eligible
                    .into_iter()
                    .collect(),
                show_set_id_pattern: DEFAULT_ID_PATTERN.to_string(),
            },
            attachments: AttachmentConfig {
                bucket: DEFAULT_ATTACHMENT_BUCKET.to_string(),
                base_url: "http://localhost:9000".to_string(),
                upload_expiry_seconds: 900, // 15 minutes
                max_size_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            },
            store: StoreConfig {
                backend: StoreBackend::File,
                directory: PathBuf::from(".showset-workflow/store"),
            },
            observability: ObservabilityConfig::default(),
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (showset-workflow.toml, .showset-workflow-rc)
    /// 3. Environment variables (prefixed with SHOWSET_WORKFLOW__)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`WorkflowConfig::load`] with configuration files looked up in `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        let toml_path = dir.join("showset-workflow.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".showset-workflow-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(config::FileFormat::Toml));
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("SHOWSET_WORKFLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let workflow_config: WorkflowConfig = config.try_deserialize()?;
        workflow_config.validate()?;
        Ok(workflow_config)
    }

    pub fn validate(&self) -> Result<()> {
        self.id_pattern()?;
        if self.attachments.upload_expiry_seconds <= 0 {
            anyhow::bail!("attachments.upload_expiry_seconds must be positive");
        }
        if self.attachments.max_size_bytes == 0 {
            anyhow::bail!("attachments.max_size_bytes must be positive");
        }
        // Reopening after an implicit unlock must reset and bump downstream work.
        if self.workflow.lock_policy == LockPolicyKind::Implicit
            && self.workflow.cascade_policy != CascadePolicyKind::LockRelease
        {
            anyhow::bail!(
                "workflow.lock_policy = \"implicit\" requires workflow.cascade_policy = \"lock_release\""
            );
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    fn id_pattern(&self) -> Result<Option<Regex>> {
        let pattern = self.workflow.show_set_id_pattern.trim();
        if pattern.is_empty() {
            return Ok(None);
        }
        Regex::new(pattern)
            .map(Some)
            .with_context(|| format!("invalid workflow.show_set_id_pattern '{pattern}'"))
    }

    pub fn orchestrator_settings(&self) -> Result<OrchestratorSettings> {
        Ok(OrchestratorSettings {
            rules: StageRules {
                scheme: self.workflow.version_scheme,
                revision_eligible: self
                    .workflow
                    .revision_eligible_stages
                    .iter()
                    .copied()
                    .collect::<BTreeSet<_>>(),
            },
            id_pattern: self.id_pattern()?,
            attachment_bucket: self.attachments.bucket.clone(),
            max_attachment_bytes: self.attachments.max_size_bytes,
        })
    }

    pub fn cascade_policy(&self) -> Arc<dyn CascadePolicy> {
        match self.workflow.cascade_policy {
            CascadePolicyKind::Rework => Arc::new(ReworkCascade),
            CascadePolicyKind::LockRelease => Arc::new(LockReleaseCascade),
        }
    }

    pub fn lock_policy(&self) -> Arc<dyn LockPolicy> {
        match self.workflow.lock_policy {
            LockPolicyKind::Explicit => Arc::new(ExplicitAdminLock),
            LockPolicyKind::Implicit => Arc::new(ImplicitCompletionLock),
        }
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<WorkflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = WorkflowConfig::load_env_file();
        WorkflowConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static WorkflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
