// ============================================================
// Layer 6 — Pretrained Weight Fetching
// ============================================================
// Resolves the safetensors checkpoint for an architecture:
//
//   --weights <path>  → used as-is
//   otherwise         → model.safetensors from the Hugging Face
//                       hub repo, cached by hf-hub under
//                       $HF_HOME (~/.cache/huggingface)
//
// Reference: hf-hub (sync ApiBuilder)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hf_hub::api::sync::ApiBuilder;

pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Return a local path to the weights for `repo_id`, downloading if needed.
pub fn resolve_weights(repo_id: &str, local: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = local {
        anyhow::ensure!(
            path.is_file(),
            "Weights file '{}' does not exist",
            path.display()
        );
        tracing::info!("Using local weights '{}'", path.display());
        return Ok(path.to_path_buf());
    }

    let api = ApiBuilder::new()
        .with_progress(true)
        .build()
        .context("Cannot initialise Hugging Face hub client")?;

    let path = api
        .model(repo_id.to_string())
        .get(WEIGHTS_FILE)
        .with_context(|| format!("Cannot fetch {WEIGHTS_FILE} from '{repo_id}'"))?;

    tracing::info!("Pretrained weights for '{}' at '{}'", repo_id, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_path_is_used_verbatim() {
        let dir  = tempfile::tempdir().unwrap();
        let file = dir.path().join("w.safetensors");
        std::fs::write(&file, b"x").unwrap();
        let got = resolve_weights("unused/repo", Some(&file)).unwrap();
        assert_eq!(got, file);
    }

    #[test]
    fn test_missing_local_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_weights("unused/repo", Some(&dir.path().join("nope"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
