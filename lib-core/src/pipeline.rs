use std::collections::BTreeMap;

use crate::{
    AppResult, ErrType,
    config::PipelineConfig,
    fetch::Fetcher,
    media,
    storage::{
        self, Storage,
        tmp::{self, CleanupHandle, StagedImage},
    },
    target::{RawTargetSpec, TargetSpec},
};

/// Spec name -> bare file name inside the storage dir
pub type VariantMap = BTreeMap<String, String>;

/// Fetches remote images and derives named variants from them.
///
/// Safe to share between tasks; concurrent calls only share the storage dir,
/// where identical `local_name`/spec names overwrite each other.
pub struct Coldlink {
    storage: Storage,
    fetcher: Fetcher,
    max_orig_size_bytes: u64,
    jpeg_quality: u8,
}

impl Coldlink {
    pub async fn new(config: PipelineConfig) -> AppResult<Self> {
        let storage = Storage::new(config.storage_dir, config.tmp_dir).await?;
        let fetcher = Fetcher::new(config.fetch_timeout_secs)?;

        Ok(Self {
            storage,
            fetcher,
            max_orig_size_bytes: config.max_orig_size_bytes,
            jpeg_quality: config.jpeg_quality,
        })
    }

    /// Downloads `url` into the tmp dir, see [`tmp::acquire`]
    pub async fn acquire(&self, url: &str) -> AppResult<(StagedImage, CleanupHandle)> {
        tmp::acquire(&self.storage, &self.fetcher, url, self.max_orig_size_bytes).await
    }

    /// Writes one variant of an already staged image
    pub async fn generate(&self, staged: &StagedImage, local_name: &str, spec: &TargetSpec) -> AppResult<String> {
        media::generate(&self.storage, staged, local_name, spec, self.jpeg_quality).await
    }

    /// Produces every spec from the image at `url`.
    ///
    /// Either every variant is reported or none is. The staged download is
    /// removed whatever happens.
    pub async fn run(&self, url: &str, local_name: &str, specs: &[TargetSpec]) -> AppResult<VariantMap> {
        self.run_with(url, local_name, specs, |spec: &TargetSpec| Ok(spec.clone())).await
    }

    /// Same as [`Self::run`] for specs coming from untrusted input.
    ///
    /// Specs are resolved one at a time, an unsupported operation stops the
    /// loop before any later spec is touched.
    pub async fn run_raw(&self, url: &str, local_name: &str, specs: &[RawTargetSpec]) -> AppResult<VariantMap> {
        self.run_with(url, local_name, specs, RawTargetSpec::resolve).await
    }

    async fn run_with<S>(
        &self,
        url: &str,
        local_name: &str,
        specs: &[S],
        resolve: impl Fn(&S) -> AppResult<TargetSpec>,
    ) -> AppResult<VariantMap> {
        if !storage::is_plain_name(local_name) {
            return Err(ErrType::InvalidTarget.msg(format!("Local name '{local_name}' must be a plain file name")));
        }

        let (staged, mut handle) = self.acquire(url).await?;

        let generated = self.generate_all(&staged, local_name, specs, &resolve).await;

        let staged_removal = storage::remove_file(&staged.path).await;
        match &staged_removal {
            Ok(()) => handle.mark_removed(),
            Err(err) => tracing::warn!(path = ?staged.path, err = %err, "Failed to remove staged image"),
        }

        let released = handle.release().await;
        if let Err(err) = &released {
            tracing::warn!(path = ?staged.path, err = %err, "Failed to release temp image");
        }

        let outcome = settle(generated, staged_removal, released);
        match &outcome {
            Ok(results) => tracing::info!(url, local_name, variants = results.len(), "Generated variants"),
            Err(err) => tracing::warn!(url, local_name, err = %err, "Failed to generate variants"),
        }
        outcome
    }

    /// Stops at the first spec that fails to resolve or generate
    async fn generate_all<S>(
        &self,
        staged: &StagedImage,
        local_name: &str,
        specs: &[S],
        resolve: &impl Fn(&S) -> AppResult<TargetSpec>,
    ) -> AppResult<VariantMap> {
        let mut results = VariantMap::new();
        for spec in specs {
            let spec = resolve(spec)?;
            let file_name = self.generate(staged, local_name, &spec).await?;
            results.insert(spec.name, file_name);
        }
        Ok(results)
    }
}

/// Folds the cleanup steps into the generation outcome.
///
/// * a staged-file removal failure fails an otherwise good run and is appended
///   to an existing error
/// * a handle failure after a good run replaces the results, even though every
///   variant is already on disk
///
/// `run_with` disarms the handle once the staged file is gone, so
/// the handle only reports a failure when the removal before it failed too and
/// the outcome is already an error. The good-run arm is unreachable from
/// `run`/`run_raw` today and is only exercised directly.
fn settle(
    generated: AppResult<VariantMap>,
    staged_removal: AppResult<()>,
    released: AppResult<()>,
) -> AppResult<VariantMap> {
    let outcome = match (generated, staged_removal) {
        (Ok(results), Ok(())) => Ok(results),
        (Ok(_), Err(removal)) => Err(removal),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(removal)) => Err(err.also(removal)),
    };

    match (outcome, released) {
        (outcome, Ok(())) => outcome,
        (Ok(_), Err(release)) => Err(release),
        (Err(err), Err(release)) => Err(err.also(release)),
    }
}
