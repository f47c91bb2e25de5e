use std::path::PathBuf;

use crate::error::UploadError;

/// Replaces every `{key}` whose key appears in `tags`, in one left-to-right
/// pass. Unknown tags stay as written and replacement text is never
/// rescanned, so the output depends only on the inputs.
pub fn render(template: &str, tags: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let hit = after.find('}').and_then(|close| {
            let key = &after[..close];
            tags.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, value)| (*value, close))
        });
        match hit {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Static HTML templates kept in one directory.
#[derive(Debug, Clone)]
pub struct Templates {
    dir: PathBuf,
}

impl Templates {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn load(&self, name: &str) -> Result<String, UploadError> {
        let path = self.dir.join(name);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| UploadError::Template(format!("failed to read {}: {e}", path.display())))
    }

    pub async fn render(&self, name: &str, tags: &[(&str, &str)]) -> Result<String, UploadError> {
        Ok(render(&self.load(name).await?, tags))
    }
}
