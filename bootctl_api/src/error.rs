use std::fmt::{Debug, Write};
use std::{borrow::Cow, panic::Location};

use serde::{ser::SerializeStruct, Deserialize, Serialize};
use strum_macros::IntoStaticStr;

/// A required input was missing or invalid. Raised before any write is sent to
/// the controller.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum PreconditionError {
    #[error("Failed to load target catalog from '{path}'")]
    LoadCatalog { path: String },
    #[error("Failed to parse target catalog")]
    ParseCatalog,
    #[error("Target catalog lists '{name}' more than once")]
    DuplicateTarget { name: String },
    #[error("Target '{name}' not found in catalog")]
    TargetNotFound { name: String },
    #[error("Controller username and password are required")]
    MissingCredentials,
    #[error("Invalid controller endpoint '{endpoint}'")]
    InvalidEndpoint { endpoint: String },
    #[error("Primary NIC '{nic}' does not have iSCSI boot configured")]
    PrimaryNicNotConfigured { nic: String },
    #[error("No boot device of class '{class}' found")]
    BootDeviceNotFound { class: String },
}

/// Staged changes could not be committed on the controller.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyError {
    #[error("Failed to set apply time for NIC '{nic}'")]
    SetApplyTime { nic: String },
    #[error("Failed to set boot order")]
    SetBootOrder,
    #[error("Failed to reset BIOS to defaults")]
    ResetBios,
}

/// The controller could not be read when its state was needed to proceed.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerError {
    #[error("Failed to create controller client")]
    CreateClient,
    #[error("Failed to enumerate network device functions")]
    EnumerateNics,
    #[error("Failed to read properties of NIC '{nic}'")]
    ReadNic { nic: String },
    #[error("Failed to read boot order")]
    ReadBootOrder,
}

#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InternalError {
    #[error("Internal error: {0}")]
    Internal(&'static str),
    #[error("Failed to write error report")]
    WriteErrorReport,
}

/// Each variant of `ErrorKind` corresponds to a different category of error.
#[derive(Debug, Eq, thiserror::Error, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// A fatal precondition was violated; nothing was written.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// The staged configuration could not be committed.
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// The controller could not be read.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// An uncategorized error occurred or a bug was encountered.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[derive(Debug)]
struct BootctlErrorInner {
    kind: ErrorKind,
    location: &'static Location<'static>,
    source: Option<anyhow::Error>,
    context: Vec<(Cow<'static, str>, &'static Location<'static>)>,
}

pub struct BootctlError(Box<BootctlErrorInner>);
impl BootctlError {
    #[track_caller]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        BootctlError(Box::new(BootctlErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: None,
            context: Vec::new(),
        }))
    }

    #[track_caller]
    pub fn internal(message: &'static str) -> Self {
        Self::new(InternalError::Internal(message))
    }

    /// Returns a reference to the inner ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    /// Process exit code for this error's category.
    pub fn exit_code(&self) -> u8 {
        match self.0.kind {
            ErrorKind::Precondition(_) => 2,
            ErrorKind::Apply(_) => 3,
            ErrorKind::Controller(_) | ErrorKind::Internal(_) => 4,
        }
    }
}

pub trait ReportError<T, K> {
    /// Convert this error into a structured BootctlError.
    fn structured(self, kind: K) -> Result<T, BootctlError>;
}

impl<T, K> ReportError<T, K> for Option<T>
where
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, BootctlError> {
        match self {
            Some(t) => Ok(t),
            None => Err(BootctlError::new(kind)),
        }
    }
}

impl<T, E, K> ReportError<T, K> for Result<T, E>
where
    E: Into<anyhow::Error>,
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, BootctlError> {
        match self {
            Ok(o) => Ok(o),
            Err(e) => Err(BootctlError(Box::new(BootctlErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: Some(e.into()),
                context: Vec::new(),
            }))),
        }
    }
}

pub trait BootctlResultExt<T> {
    /// Attach a context message to the error.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, BootctlError>;
}

impl<T> BootctlResultExt<T> for Result<T, BootctlError> {
    #[track_caller]
    fn message(mut self, context: impl Into<Cow<'static, str>>) -> Result<T, BootctlError> {
        if let Err(ref mut e) = self {
            e.0.context.push((context.into(), Location::caller()));
        }
        self
    }
}

impl Serialize for BootctlError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("bootctl-error", 5)?;
        state.serialize_field("message", &self.0.kind.to_string())?;
        match self.0.kind {
            ErrorKind::Precondition(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Apply(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Controller(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Internal(ref e) => state.serialize_field("error", e)?,
        }
        state.serialize_field("category", <&str>::from(&self.0.kind))?;
        state.serialize_field(
            "location",
            &format!("{}:{}", self.0.location.file(), self.0.location.line()),
        )?;
        match self.0.source {
            Some(ref e) => state.serialize_field("cause", &Some(format!("{e:?}")))?,
            None => state.serialize_field("cause", &None::<String>)?,
        }
        state.end()
    }
}

impl Debug for BootctlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.0.kind,
            self.0.location.file(),
            self.0.location.line()
        )?;

        if !self.0.context.is_empty() {
            writeln!(f, "\n\nContext:")?;
            for (i, (context, location)) in self.0.context.iter().enumerate() {
                for (j, line) in context.split('\n').enumerate() {
                    if j == 0 {
                        write!(f, "{i: >5}: ")?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                writeln!(f, " at {}:{}", location.file(), location.line())?;
            }
        }

        if let Some(ref source) = self.0.source {
            writeln!(f, "\n\nCaused by:")?;
            let mut index = 0;
            let mut source: Option<&dyn std::error::Error> = Some(source.as_ref());
            while let Some(e) = source {
                for (i, line) in e.to_string().split('\n').enumerate() {
                    if i == 0 {
                        write!(f, "{index: >5}: ")?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                f.write_char('\n')?;
                source = e.source();
                index += 1;
            }
        }
        Ok(())
    }
}
