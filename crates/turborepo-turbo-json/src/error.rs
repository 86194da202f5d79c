#[derive(Debug, thiserror::Error)]
pub enum TurboJsonError {
    #[error("failed to read {0}: {1}")]
    Io(String, #[source] turbopath::PathError),
    #[error("{0} is not valid JSON: {1}")]
    Parse(String, String),
    #[error("{0} does not match the turbo.json shape: {1}")]
    Deserialize(String, #[source] serde_json::Error),
    #[error(
        "\"{0}\" in `dependsOn` for task `{1}` is not prefixed correctly: env vars must be \
         listed under `env`, not `$`-prefixed inside `dependsOn` (fatal outside dependsOn)"
    )]
    EnvPrefixInWrongPlace(String, String),
    #[error("\"{0}\" in `env` for task `{1}`: env vars must not be prefixed with `$`")]
    EnvPrefixInEnv(String, String),
    #[error("\"{0}\" in `globalEnv`: env vars must not be prefixed with `$`")]
    EnvPrefixInGlobalEnv(String),
    #[error(
        "task `{task}`'s package override sets `{field}`, which per-package turbo.json may not \
         redefine"
    )]
    DisallowedOverrideField { task: String, field: &'static str },
    #[error(
        "task `{0}`'s `dependsOn` entry `{1}` is cross-package, but this is a single-package \
         repo; only root-qualified references (e.g. `//#build`) are allowed"
    )]
    SinglePackageCrossPackageDep(String, String),
    #[error("`extends` must name exactly the root package (\"//\"), got {0:?}")]
    ExtendsNotRoot(Vec<String>),
    #[error("unknown task `{0}` referenced in `dependsOn`")]
    UnknownTask(String),
}
