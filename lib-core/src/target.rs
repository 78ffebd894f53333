use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::{AppError, AppResult, ErrType, storage};

pub const ORIG: &str = "orig";
pub const SM: &str = "sm";
pub const XS: &str = "xs";

const SM_DIM: u32 = 150;
const XS_DIM: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Byte for byte copy of the source
    Copy,
    /// Exact `width` x `height` rendition, cropped to the target aspect ratio
    Thumbnail {
        width: u32,
        height: u32,
    },
}

/// One requested variant.
///
/// Serializes to the [`RawTargetSpec`] shape; serialized input is read back
/// through that form so names are always validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSpec {
    /// Suffix of the output file and key of the result map
    pub name: String,

    #[serde(flatten)]
    pub operation: Operation,
}

impl TargetSpec {
    pub fn copy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operation: Operation::Copy,
        }
    }

    pub fn thumbnail(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            operation: Operation::Thumbnail {
                width,
                height,
            },
        }
    }

    /// original dimensions
    pub fn orig() -> Self {
        Self::copy(ORIG)
    }

    /// 150x150
    pub fn sm() -> Self {
        Self::thumbnail(SM, SM_DIM, SM_DIM)
    }

    /// 50x50
    pub fn xs() -> Self {
        Self::thumbnail(XS, XS_DIM, XS_DIM)
    }

    pub fn presets() -> Vec<Self> {
        vec![Self::orig(), Self::sm(), Self::xs()]
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if !storage::is_plain_name(name) {
        return Err(ValidationError::new("path_separator"));
    }
    Ok(())
}

/// Target spec as received from untrusted input.
///
/// `op` is kept as free text so unsupported operations are only rejected when
/// the pipeline reaches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RawTargetSpec {
    #[validate(length(min = 1, max = 255), custom(function = "validate_name"))]
    pub name: String,

    pub op: String,

    #[validate(range(min = 1))]
    #[serde(default)]
    pub width: Option<u32>,

    #[validate(range(min = 1))]
    #[serde(default)]
    pub height: Option<u32>,
}

impl RawTargetSpec {
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            width: None,
            height: None,
        }
    }

    pub fn resolve(&self) -> AppResult<TargetSpec> {
        self.validate()
            .map_err(|err| ErrType::InvalidTarget.err(err, format!("Invalid target spec '{}'", self.name)))?;

        match self.op.trim().to_ascii_lowercase().as_str() {
            "copy" => Ok(TargetSpec::copy(&self.name)),
            "thumbnail" => match (self.width, self.height) {
                (Some(width), Some(height)) => Ok(TargetSpec::thumbnail(&self.name, width, height)),
                _ => Err(ErrType::InvalidTarget
                    .msg(format!("Thumbnail target '{}' needs both width and height", self.name))),
            },
            op => Err(ErrType::UnknownTarget.msg(format!("Unknown target {} (operation '{op}')", self.name))),
        }
    }
}

impl From<&TargetSpec> for RawTargetSpec {
    fn from(spec: &TargetSpec) -> Self {
        match spec.operation {
            Operation::Copy => Self::new(&spec.name, "copy"),
            Operation::Thumbnail {
                width,
                height,
            } => Self {
                name: spec.name.clone(),
                op: "thumbnail".into(),
                width: Some(width),
                height: Some(height),
            },
        }
    }
}

/// Parses the command line form of a target
///
/// * `orig`, `sm`, `xs` for the built-in presets
/// * `<name>=copy`
/// * `<name>=<width>x<height>`
/// * anything else is kept verbatim and fails at resolution
impl FromStr for RawTargetSpec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let Some((name, op)) = s.split_once('=') else {
            return Ok(match s {
                ORIG => (&TargetSpec::orig()).into(),
                SM => (&TargetSpec::sm()).into(),
                XS => (&TargetSpec::xs()).into(),
                name => Self::new(name, name),
            });
        };

        let (name, op) = (name.trim(), op.trim());
        if name.is_empty() {
            return Err(ErrType::InvalidTarget.msg(format!("Target '{s}' has no name")));
        }

        let dims = op.split_once(['x', 'X']).and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)));

        Ok(match dims {
            Some((width, height)) => Self {
                name: name.into(),
                op: "thumbnail".into(),
                width: Some(width),
                height: Some(height),
            },
            None => Self::new(name, op),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_builtin_sizes() {
        assert_eq!(
            TargetSpec::presets(),
            vec![TargetSpec::copy("orig"), TargetSpec::thumbnail("sm", 150, 150), TargetSpec::thumbnail("xs", 50, 50)]
        );
    }

    #[test]
    fn parses_cli_forms() {
        let resolve = |s: &str| s.parse::<RawTargetSpec>().and_then(|raw| raw.resolve());

        assert_eq!(resolve("orig").unwrap(), TargetSpec::orig());
        assert_eq!(resolve("sm").unwrap(), TargetSpec::sm());
        assert_eq!(resolve("xs").unwrap(), TargetSpec::xs());
        assert_eq!(resolve("full=copy").unwrap(), TargetSpec::copy("full"));
        assert_eq!(resolve("wide = 320x180").unwrap(), TargetSpec::thumbnail("wide", 320, 180));
    }

    #[test]
    fn unknown_operations_survive_parsing() {
        let raw: RawTargetSpec = "sepia".parse().unwrap();
        assert_eq!(raw.resolve().unwrap_err().kind(), &ErrType::UnknownTarget);

        let raw: RawTargetSpec = "old=sepia".parse().unwrap();
        let err = raw.resolve().unwrap_err();
        assert_eq!(err.kind(), &ErrType::UnknownTarget);
        assert!(err.message().contains("old"));
    }

    #[test]
    fn nameless_target_is_rejected() {
        let err = "=copy".parse::<RawTargetSpec>().unwrap_err();
        assert_eq!(err.kind(), &ErrType::InvalidTarget);
    }

    #[test]
    fn thumbnail_needs_positive_dimensions() {
        let mut raw = RawTargetSpec::new("thumb", "thumbnail");
        assert_eq!(raw.resolve().unwrap_err().kind(), &ErrType::InvalidTarget);

        raw.width = Some(0);
        raw.height = Some(10);
        assert_eq!(raw.resolve().unwrap_err().kind(), &ErrType::InvalidTarget);

        let raw: RawTargetSpec = "thumb=0x10".parse().unwrap();
        assert_eq!(raw.resolve().unwrap_err().kind(), &ErrType::InvalidTarget);
    }

    #[test]
    fn names_cannot_escape_storage_dir() {
        for name in ["../evil", "..", ".", "a/b", "a\\b"] {
            let raw = RawTargetSpec::new(name, "copy");
            assert_eq!(raw.resolve().unwrap_err().kind(), &ErrType::InvalidTarget, "{name}");
        }
    }

    #[test]
    fn deserializes_raw_specs() {
        let raw: Vec<RawTargetSpec> = serde_json::from_str(
            r#"[{"name":"orig","op":"copy"},{"name":"sm","op":"Thumbnail","width":150,"height":150}]"#,
        )
        .unwrap();
        let resolved: Vec<TargetSpec> = raw.iter().map(|raw| raw.resolve().unwrap()).collect();
        assert_eq!(resolved, vec![TargetSpec::orig(), TargetSpec::sm()]);
    }

    #[test]
    fn typed_specs_are_read_back_through_raw_form() {
        let json = serde_json::to_string(&TargetSpec::presets()).unwrap();

        let raw: Vec<RawTargetSpec> = serde_json::from_str(&json).unwrap();
        let resolved: Vec<TargetSpec> = raw.iter().map(|raw| raw.resolve().unwrap()).collect();
        assert_eq!(resolved, TargetSpec::presets());

        let escaping = serde_json::to_string(&TargetSpec::copy("../evil")).unwrap();
        let raw: RawTargetSpec = serde_json::from_str(&escaping).unwrap();
        assert_eq!(raw.resolve().unwrap_err().kind(), &ErrType::InvalidTarget);
    }
}
