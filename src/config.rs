// config.rs - viewer settings from a JSON file, CLI flags and environment

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::atlas::{LayoutChoice, PackingScheme};
use crate::orientation::{DragPolicy, DEFAULT_SENSITIVITY};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("unknown value {value:?} for {flag}")]
    UnknownValue { flag: &'static str, value: String },
    #[error("invalid atlas layout: {0}")]
    InvalidLayout(String),
}

/// Perspective used for the mono path.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov_y_degrees: 60.0,
            near: 0.01,
            far: 10000.0,
        }
    }
}

impl CameraSettings {
    pub fn projection(&self, aspect: f32) -> glam::Mat4 {
        glam::Mat4::perspective_rh(self.fov_y_degrees.to_radians(), aspect, self.near, self.far)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendChoice {
    #[default]
    None,
    MockStereo,
    MockImmersive,
}

impl FromStr for BackendChoice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(BackendChoice::None),
            "mock-stereo" | "stereo" => Ok(BackendChoice::MockStereo),
            "mock-immersive" | "immersive" => Ok(BackendChoice::MockImmersive),
            other => Err(ConfigError::UnknownValue {
                flag: "--backend",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Directories play as image sequences, files load as still images.
    #[default]
    Auto,
    Image,
    Sequence,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "Cubemap Viewer".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub source: Option<PathBuf>,
    pub source_kind: SourceKind,
    pub sequence_fps: f32,
    pub sequence_loop: bool,
    pub layout: LayoutChoice,
    pub drag_policy: DragPolicy,
    /// Degrees per pixel.
    pub sensitivity: f32,
    pub camera: CameraSettings,
    pub backend: BackendChoice,
    pub window: WindowSettings,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            source: None,
            source_kind: SourceKind::Auto,
            sequence_fps: 30.0,
            sequence_loop: true,
            layout: LayoutChoice::default(),
            drag_policy: DragPolicy::default(),
            sensitivity: DEFAULT_SENSITIVITY,
            camera: CameraSettings::default(),
            backend: BackendChoice::None,
            window: WindowSettings::default(),
        }
    }
}

pub const ENV_SOURCE: &str = "CUBEMAP_SOURCE";
pub const ENV_BACKEND: &str = "CUBEMAP_BACKEND";

impl ViewerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Process arguments and environment, in that order of precedence.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self::from_args_and_env(std::env::args().skip(1), env)
    }

    /// `--config` is read first; every other flag overrides the file, and
    /// environment values only fill in what neither provided.
    pub fn from_args_and_env<I, E>(args: I, env: E) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
        E: Fn(&str) -> Option<String>,
    {
        let args: Vec<String> = args.into_iter().collect();

        let mut config = match find_flag(&args, "--config")? {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        let mut backend_from_flag = false;
        let mut it = args.into_iter();
        while let Some(arg) = it.next() {
            let mut value = |flag: &str| it.next().ok_or_else(|| ConfigError::MissingValue(flag.to_string()));
            match arg.as_str() {
                "--config" => {
                    value("--config")?;
                }
                "--source" => config.source = Some(PathBuf::from(value("--source")?)),
                "--sequence" => {
                    config.source = Some(PathBuf::from(value("--sequence")?));
                    config.source_kind = SourceKind::Sequence;
                }
                "--fps" => {
                    let raw = value("--fps")?;
                    config.sequence_fps = raw
                        .parse::<f32>()
                        .ok()
                        .filter(|fps| *fps > 0.0)
                        .ok_or(ConfigError::UnknownValue { flag: "--fps", value: raw })?;
                }
                "--sensitivity" => {
                    let raw = value("--sensitivity")?;
                    config.sensitivity = raw
                        .parse::<f32>()
                        .ok()
                        .filter(|s| *s > 0.0)
                        .ok_or(ConfigError::UnknownValue { flag: "--sensitivity", value: raw })?;
                }
                "--layout" => {
                    config.layout = LayoutChoice::Scheme(value("--layout")?.parse::<PackingScheme>()?)
                }
                "--policy" => config.drag_policy = value("--policy")?.parse()?,
                "--backend" => {
                    config.backend = value("--backend")?.parse()?;
                    backend_from_flag = true;
                }
                "--no-loop" => config.sequence_loop = false,
                other if !other.starts_with("--") => config.source = Some(PathBuf::from(other)),
                other => {
                    return Err(ConfigError::UnknownValue {
                        flag: "argument",
                        value: other.to_string(),
                    })
                }
            }
        }

        if config.source.is_none() {
            config.source = env(ENV_SOURCE).map(PathBuf::from);
        }
        if !backend_from_flag && config.backend == BackendChoice::None {
            if let Some(v) = env(ENV_BACKEND) {
                config.backend = v.parse()?;
            }
        }

        config.layout.resolve()?;
        Ok(config)
    }
}

fn find_flag(args: &[String], flag: &str) -> Result<Option<String>, ConfigError> {
    match args.iter().position(|a| a == flag) {
        Some(i) => args
            .get(i + 1)
            .cloned()
            .map(Some)
            .ok_or_else(|| ConfigError::MissingValue(flag.to_string())),
        None => Ok(None),
    }
}
