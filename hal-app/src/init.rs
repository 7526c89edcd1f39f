//! Scaffolding for `halbridge init`.
//!
//! Writes the config and identity templates into `~/.hal/` without
//! overwriting existing local files.

use anyhow::Result;
use std::path::{Path, PathBuf};

pub const DEFAULT_ORG_NAME: &str = "My Org";
const ORG_PLACEHOLDER: &str = "<YOUR_ORG_NAME>";

#[derive(Debug, Clone, Default)]
pub struct InitReport {
    pub root: PathBuf,
    pub created: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
struct TemplateFile {
    relative_path: &'static str,
    contents: &'static str,
}

const TEMPLATE_FILES: &[TemplateFile] = &[
    TemplateFile {
        relative_path: "config.toml",
        contents: include_str!("../../config-templates/config.toml"),
    },
    TemplateFile {
        relative_path: "HAL_IDENTITY.md",
        contents: include_str!("../../config-templates/HAL_IDENTITY.md"),
    },
];

pub async fn initialize_default(org_name: &str) -> Result<InitReport> {
    let config_path = crate::config::default_config_path()?;
    let root = config_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid default config path: {}", config_path.display()))?
        .to_path_buf();
    initialize_at_root(&root, org_name).await
}

pub async fn initialize_at_root(root: &Path, org_name: &str) -> Result<InitReport> {
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| anyhow::anyhow!("create config root {}: {e}", root.display()))?;

    let mut report = InitReport {
        root: root.to_path_buf(),
        created: Vec::new(),
        skipped: Vec::new(),
    };

    for template in TEMPLATE_FILES {
        let target = root.join(template.relative_path);
        match tokio::fs::metadata(&target).await {
            Ok(_) => report.skipped.push(target),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let contents = render_template(template.contents, org_name);
                tokio::fs::write(&target, contents).await.map_err(|e| {
                    anyhow::anyhow!("write template {}: {e}", target.display())
                })?;
                tracing::info!(path = %target.display(), "created template");
                report.created.push(target);
            }
            Err(err) => {
                return Err(anyhow::anyhow!(
                    "inspect config path {}: {err}",
                    target.display()
                ));
            }
        }
    }

    Ok(report)
}

fn render_template(contents: &str, org_name: &str) -> String {
    let org_name = match org_name.trim() {
        "" => DEFAULT_ORG_NAME,
        name => name,
    };
    contents.replace(ORG_PLACEHOLDER, org_name)
}
