//! Recursive directory copy with optional `{{VAR}}` templating, used by
//! the `copy` container helper.

use std::fs;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::HelperError;
use crate::interpolation::Variables;

/// `{{NAME}}`: any run of non-space characters other than `}`.
const PLACEHOLDER: &str = r"\{\{([^}\s]+)\}\}";

fn io_error(context: String) -> impl FnOnce(std::io::Error) -> HelperError {
    move |source| HelperError::Io { context, source }
}

/// Replace every `{{NAME}}` whose variable is set; unknown placeholders are
/// left as they are. Returns the rendered text and the names replaced.
fn render<V: Variables + ?Sized>(
    pattern: &Regex,
    content: &str,
    vars: &V,
) -> (String, Vec<String>) {
    let mut replaced = Vec::new();
    let rendered = pattern.replace_all(content, |caps: &Captures<'_>| match vars.lookup(&caps[1]) {
        Some(value) => {
            replaced.push(caps[1].to_string());
            value.to_string()
        }
        None => caps[0].to_string(),
    });
    (rendered.into_owned(), replaced)
}

pub fn render_template<V: Variables + ?Sized>(
    content: &str,
    vars: &V,
) -> Result<(String, Vec<String>), HelperError> {
    let pattern = Regex::new(PLACEHOLDER)?;
    Ok(render(&pattern, content, vars))
}

/// Copy every file under `source` to the same relative path under
/// `destination`, keeping permissions. With `vars`, UTF-8 files are
/// templated; other files are copied byte for byte.
///
/// Returns the destination paths written, in walk order.
pub fn copy_tree<V: Variables + ?Sized>(
    source: &Path,
    destination: &Path,
    vars: Option<&V>,
) -> Result<Vec<PathBuf>, HelperError> {
    for dir in [source, destination] {
        if !dir.is_dir() {
            return Err(HelperError::NotADirectory(dir.to_path_buf()));
        }
    }
    let pattern = Regex::new(PLACEHOLDER)?;

    let mut written = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(io_error(format!("creating {}", parent.display())))?;
        }

        info!("copying '{}' to '{}'", entry.path().display(), target.display());
        let bytes = fs::read(entry.path())
            .map_err(io_error(format!("reading {}", entry.path().display())))?;
        let content = match vars {
            Some(vars) => match String::from_utf8(bytes) {
                Ok(text) => {
                    let (rendered, replaced) = render(&pattern, &text, vars);
                    for name in replaced {
                        debug!("replaced '{{{{{name}}}}}' in '{}'", target.display());
                    }
                    rendered.into_bytes()
                }
                Err(binary) => binary.into_bytes(),
            },
            None => bytes,
        };
        fs::write(&target, content).map_err(io_error(format!("writing {}", target.display())))?;

        let permissions = entry.metadata()?.permissions();
        fs::set_permissions(&target, permissions)
            .map_err(io_error(format!("setting permissions on {}", target.display())))?;
        written.push(target);
    }
    Ok(written)
}
