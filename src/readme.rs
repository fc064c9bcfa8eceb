// README.md generators. Every uploaded artifact must ship a README.md at
// its root; these helpers write one from the cursor identity.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};

use crate::error::{IoContext, Result};
use crate::identity::Identity;
use crate::validate::README_FILE;

pub fn render_model_readme(
    identity: &Identity,
    description: &str,
    metrics: &[(String, String)],
    created: DateTime<Local>,
) -> String {
    let mut readme = String::from("# Model description\n");
    push_description(&mut readme, description);
    readme.push_str("## Params\n");
    push_common_params(&mut readme, identity);
    let _ = writeln!(readme, "* `label`={}", identity.label());
    push_created(&mut readme, created);

    if !metrics.is_empty() {
        readme.push_str("\n## Metrics\n");
        for (key, value) in metrics {
            let _ = writeln!(readme, "* `{}`={}", key, value);
        }
    }
    readme
}

pub fn render_module_readme(identity: &Identity, description: &str, created: DateTime<Local>) -> String {
    let mut readme = String::from("# Module description\n");
    push_description(&mut readme, description);
    readme.push_str("## Params\n");
    push_common_params(&mut readme, identity);
    push_created(&mut readme, created);
    readme
}

/// Write `content` to `dst/README.md`, replacing any previous file.
pub fn write_readme(dst: &Path, content: &str) -> Result<()> {
    let path = dst.join(README_FILE);
    fs::write(&path, content).io_context(|| format!("write {}", path.display()))
}

fn push_description(readme: &mut String, description: &str) {
    if !description.is_empty() {
        readme.push_str(description.trim_end());
        readme.push('\n');
    }
    readme.push('\n');
}

fn push_common_params(readme: &mut String, identity: &Identity) {
    let _ = writeln!(readme, "* `team`={}", identity.team());
    let _ = writeln!(readme, "* `project`={}", identity.project());
    let _ = writeln!(readme, "* `name`={}", identity.name().unwrap_or(""));
}

fn push_created(readme: &mut String, created: DateTime<Local>) {
    let _ = writeln!(readme, "* `create_datetime`={}", created.format("%Y-%m-%d %H:%M:%S"));
}
