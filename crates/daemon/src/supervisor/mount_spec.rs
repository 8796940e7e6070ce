//! Per-volume mount description, decoded from the orchestrator's options.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde_json::{Map, Value};

use common::duration::{parse_ttl, DurationError};

pub const DEFAULT_DIR_MODE: &str = "0755";
pub const DEFAULT_FILE_MODE: &str = "0644";

/// What to do with a running mount once a fresh lease has been written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenewalPolicy {
    /// Rewrite the credentials file and leave the subprocess alone.
    #[default]
    InPlace,
    /// Rewrite the credentials file, then relaunch the subprocess.
    Restart,
}

impl FromStr for RenewalPolicy {
    type Err = MountSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-place" => Ok(RenewalPolicy::InPlace),
            "restart" => Ok(RenewalPolicy::Restart),
            other => Err(MountSpecError::InvalidRenewalPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for RenewalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenewalPolicy::InPlace => write!(f, "in-place"),
            RenewalPolicy::Restart => write!(f, "restart"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MountSpecError {
    #[error("failed to parse options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
    #[error("options must be a JSON object")]
    NotAnObject,
    #[error("bucket option is required")]
    MissingBucket,
    #[error("failed to parse vault-ttl {value:?}: {source}")]
    InvalidTtl {
        value: String,
        #[source]
        source: DurationError,
    },
    #[error("unknown renewal-policy {0:?}, expected \"in-place\" or \"restart\"")]
    InvalidRenewalPolicy(String),
}

/// Immutable description of one mount, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub target: PathBuf,
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub uid: Option<String>,
    pub gid: Option<String>,
    pub dir_mode: String,
    pub file_mode: String,
    pub debug: bool,
    pub secret_path: String,
    pub requested_ttl: Duration,
    pub renewal_policy: RenewalPolicy,
}

impl MountSpec {
    /// Parse the JSON options string handed to the `mount` call.
    pub fn from_options(target: impl Into<PathBuf>, options: &str) -> Result<Self, MountSpecError> {
        match serde_json::from_str::<Value>(options)? {
            Value::Object(map) => Self::from_map(target, &map),
            _ => Err(MountSpecError::NotAnObject),
        }
    }

    pub fn from_map(
        target: impl Into<PathBuf>,
        options: &Map<String, Value>,
    ) -> Result<Self, MountSpecError> {
        let opt = |key: &str| options.get(key).and_then(option_string);

        let requested_ttl = match opt("vault-ttl") {
            Some(value) => parse_ttl(&value)
                .map_err(|source| MountSpecError::InvalidTtl { value, source })?,
            None => Duration::ZERO,
        };

        let debug = match opt("debug_s3") {
            Some(value) => parse_bool(&value).unwrap_or_else(|| {
                tracing::warn!("failed to parse bool for debug_s3: {:?}, assuming false", value);
                false
            }),
            None => false,
        };

        let renewal_policy = match opt("renewal-policy") {
            Some(value) => value.parse()?,
            None => RenewalPolicy::default(),
        };

        Ok(Self {
            target: target.into(),
            bucket: opt("bucket").ok_or(MountSpecError::MissingBucket)?,
            endpoint: opt("endpoint"),
            region: opt("region"),
            uid: opt("uid"),
            gid: opt("gid"),
            dir_mode: opt("dirMode").unwrap_or_else(|| DEFAULT_DIR_MODE.to_string()),
            file_mode: opt("fileMode").unwrap_or_else(|| DEFAULT_FILE_MODE.to_string()),
            debug,
            secret_path: opt("vault-path").unwrap_or_default(),
            requested_ttl,
            renewal_policy,
        })
    }

    /// Argument vector for the mount executable.
    pub fn mount_args(&self, credentials_file: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            "-o".into(),
            "allow_other".into(),
            "--dir-mode".into(),
            self.dir_mode.clone().into(),
            "--file-mode".into(),
            self.file_mode.clone().into(),
        ];

        let optional = [
            ("--endpoint", &self.endpoint),
            ("--region", &self.region),
            ("--uid", &self.uid),
            ("--gid", &self.gid),
        ];
        for (flag, value) in optional {
            if let Some(value) = value {
                args.push(flag.into());
                args.push(value.clone().into());
            }
        }

        if self.debug {
            args.push("--debug_s3".into());
        }

        args.push("--cred-filename".into());
        args.push(credentials_file.as_os_str().to_owned());
        args.push(self.bucket.clone().into());
        args.push(self.target.as_os_str().to_owned());
        args
    }
}

/// Orchestrators send every option as a string, but hand-written specs
/// sometimes carry bare numbers or booleans.
fn option_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(spec: &MountSpec) -> Vec<String> {
        spec.mount_args(Path::new("/tmp/x.creds"))
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect()
    }

    #[test]
    fn test_minimal_options() {
        let spec = MountSpec::from_options("/mnt/data", r#"{"bucket":"team-data"}"#).unwrap();
        assert_eq!(spec.dir_mode, DEFAULT_DIR_MODE);
        assert_eq!(spec.file_mode, DEFAULT_FILE_MODE);
        assert_eq!(spec.requested_ttl, Duration::ZERO);
        assert_eq!(spec.secret_path, "");
        assert_eq!(spec.renewal_policy, RenewalPolicy::InPlace);

        assert_eq!(
            args_of(&spec),
            vec![
                "-f",
                "-o",
                "allow_other",
                "--dir-mode",
                "0755",
                "--file-mode",
                "0644",
                "--cred-filename",
                "/tmp/x.creds",
                "team-data",
                "/mnt/data",
            ]
        );
    }

    #[test]
    fn test_full_options() {
        let spec = MountSpec::from_options(
            "/mnt/data",
            r#"{
                "bucket": "team-data",
                "vault-path": "minio/keys/team",
                "vault-ttl": "1h30m",
                "endpoint": "http://minio:9000",
                "region": "us-east-1",
                "uid": "1000",
                "gid": 100,
                "dirMode": "0750",
                "fileMode": "0640",
                "debug_s3": "true",
                "renewal-policy": "restart",
                "kubernetes.io/fsType": ""
            }"#,
        )
        .unwrap();

        assert_eq!(spec.secret_path, "minio/keys/team");
        assert_eq!(spec.requested_ttl, Duration::from_secs(5400));
        assert_eq!(spec.renewal_policy, RenewalPolicy::Restart);
        assert!(spec.debug);

        let args = args_of(&spec);
        assert!(args
            .windows(2)
            .any(|w| w[0] == "--endpoint" && w[1] == "http://minio:9000"));
        assert!(args.windows(2).any(|w| w[0] == "--gid" && w[1] == "100"));
        assert!(args.contains(&"--debug_s3".to_string()));
        assert_eq!(&args[args.len() - 2..], ["team-data", "/mnt/data"]);
    }

    #[test]
    fn test_invalid_debug_flag_is_false() {
        let spec =
            MountSpec::from_options("/mnt/x", r#"{"bucket":"b","debug_s3":"sometimes"}"#).unwrap();
        assert!(!spec.debug);
    }

    #[test]
    fn test_negative_ttl_requests_backend_default() {
        let spec =
            MountSpec::from_options("/mnt/x", r#"{"bucket":"b","vault-ttl":"-5m"}"#).unwrap();
        assert_eq!(spec.requested_ttl, Duration::ZERO);
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            MountSpec::from_options("/mnt/x", r#"{"vault-path":"p"}"#),
            Err(MountSpecError::MissingBucket)
        ));
        assert!(matches!(
            MountSpec::from_options("/mnt/x", r#"{"bucket":"b","vault-ttl":"soon"}"#),
            Err(MountSpecError::InvalidTtl { .. })
        ));
        assert!(matches!(
            MountSpec::from_options("/mnt/x", r#"{"bucket":"b","renewal-policy":"never"}"#),
            Err(MountSpecError::InvalidRenewalPolicy(_))
        ));
        assert!(matches!(
            MountSpec::from_options("/mnt/x", "[]"),
            Err(MountSpecError::NotAnObject)
        ));
        assert!(matches!(
            MountSpec::from_options("/mnt/x", "{"),
            Err(MountSpecError::InvalidOptions(_))
        ));
    }
}
