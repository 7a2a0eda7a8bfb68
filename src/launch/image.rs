//! Image setup: pulls and Dockerfile builds
//!
//! Runs before container creation and resolves an [`ImageSource`] to the
//! image reference that terminates the creation argument vector.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ImageSource;
use crate::error::Error;
use crate::runner::{ArgList, CommandRunner};
use crate::vars;

/// Resolve the image source, pulling or building as required, and return the
/// reference to run.
pub(crate) async fn setup_image(
    runner: &dyn CommandRunner,
    source: &ImageSource,
    build_vars: &HashMap<String, String>,
    workspace: &Path,
) -> Result<String, Error> {
    match source {
        ImageSource::Image {
            reference,
            force_pull,
            pull_retries,
        } => {
            let reference = vars::resolve(build_vars, reference);
            if *force_pull {
                pull_with_retries(runner, &reference, *pull_retries).await?;
            }
            Ok(reference)
        }
        ImageSource::Dockerfile {
            file,
            text,
            context,
            build_args,
            force_pull,
            squash,
            tag,
        } => {
            build_image(
                runner, build_vars, workspace, file, text, context, build_args, *force_pull,
                *squash, tag,
            )
            .await
        }
    }
}

/// Pull an image, retrying immediately on failure until the bound is
/// exhausted. No backoff: retry timing is observable build duration.
async fn pull_with_retries(
    runner: &dyn CommandRunner,
    reference: &str,
    retries: u32,
) -> Result<(), Error> {
    let attempts = retries + 1;
    let mut last_stderr = String::new();

    for attempt in 1..=attempts {
        let args = ArgList::from_tokens(["pull", reference]);
        let out = runner.run(&args).await?;
        if out.success() {
            info!(image = %reference, attempt, "Image pulled");
            return Ok(());
        }
        last_stderr = out.stderr.trim().to_string();
        warn!(image = %reference, attempt, "Image pull failed");
    }

    Err(Error::Launch(format!(
        "failed to pull image {reference} after {attempts} attempts: {last_stderr}"
    )))
}

/// Build an image from a Dockerfile. Inline contents are materialized into a
/// temp directory that lives until the build finishes.
#[allow(clippy::too_many_arguments)]
async fn build_image(
    runner: &dyn CommandRunner,
    build_vars: &HashMap<String, String>,
    workspace: &Path,
    file: &Option<String>,
    text: &Option<String>,
    context: &Option<String>,
    build_args: &std::collections::BTreeMap<String, String>,
    force_pull: bool,
    squash: bool,
    tag: &Option<String>,
) -> Result<String, Error> {
    let image = match tag.as_deref() {
        Some(tag) if !tag.is_empty() => vars::resolve(build_vars, tag),
        _ => Uuid::new_v4().to_string(),
    };

    let mut args = ArgList::from_tokens(["build"]);
    if force_pull {
        args.add("--pull");
    }
    if squash {
        args.add("--squash");
    }
    for (key, value) in build_args {
        args.add("--build-arg");
        args.add(format!("{key}={}", vars::resolve(build_vars, value)));
    }
    args.add_pair("-t", &image);

    // Inline text wins over a file path; it needs a real file on disk.
    let mut inline_dir = None;
    match (text.as_deref(), file.as_deref()) {
        (Some(text), _) if !text.is_empty() => {
            let dir = tempfile::tempdir()?;
            let path = dir.path().join("Dockerfile");
            tokio::fs::write(&path, text).await?;
            args.add_pair("-f", path.display().to_string());
            inline_dir = Some(dir);
        }
        (_, Some(file)) if !file.is_empty() => {
            args.add_pair("-f", vars::resolve(build_vars, file));
        }
        _ => {}
    }

    match context.as_deref() {
        Some(context) if !context.is_empty() => {
            args.add(vars::resolve(build_vars, context));
        }
        _ => {
            args.add(workspace.display().to_string());
        }
    }

    let out = runner.run(&args).await?;
    drop(inline_dir);
    if !out.success() {
        return Err(Error::Launch(format!(
            "image failed to build: {}",
            out.stderr.trim()
        )));
    }

    info!(image = %image, "Image built");
    Ok(image)
}
