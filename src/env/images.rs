use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::dialogue::ImageGenerator;

static DESCRIBED_IMAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+\.png):(.*?)\n").unwrap());

static IMAGE_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+\.png)").unwrap());

/// Image filename to description.
pub type ImageMap = BTreeMap<String, String>;

/// Parse `name.png: description` lines. When no line carries a description,
/// every bare `name.png` is taken with a description derived from its name.
pub fn extract_proposed_images(text: &str) -> ImageMap {
    let mut images: ImageMap = DESCRIBED_IMAGE_REGEX
        .captures_iter(text)
        .map(|cap| (cap[1].trim().to_string(), cap[2].trim().to_string()))
        .collect();

    if images.is_empty() {
        for m in IMAGE_NAME_REGEX.find_iter(text) {
            let name = m.as_str().to_string();
            images
                .entry(name.clone())
                .or_insert_with(|| describe_from_name(&name));
        }
    }
    images
}

/// Images referenced anywhere in `code`, described by their names.
pub fn referenced_images(code: &str) -> ImageMap {
    IMAGE_NAME_REGEX
        .find_iter(code)
        .map(|m| (m.as_str().to_string(), describe_from_name(m.as_str())))
        .collect()
}

fn describe_from_name(name: &str) -> String {
    name.trim_end_matches(".png").replace('_', " ")
}

/// Generate every image in `images` that does not exist in `directory` yet.
/// Generator failures are logged and skipped. Returns how many images were
/// written.
pub async fn generate_missing(
    directory: &Path,
    images: &ImageMap,
    generator: &dyn ImageGenerator,
    size: &str,
) -> Result<usize> {
    let mut written = 0;
    for (name, description) in images {
        let path = directory.join(name);
        if path.exists() {
            continue;
        }
        match generator.generate(description, size).await {
            Ok(Some(bytes)) => {
                std::fs::write(&path, bytes)
                    .with_context(|| format!("Failed to write image {}", path.display()))?;
                info!(image = %name, "Generated image");
                written += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(image = %name, error = %e, "Image generation failed, skipping"),
        }
    }
    Ok(written)
}
