// atlas.rs - packing schemes that map one atlas image onto the six cube faces

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// Cube faces in mesh order. Every per-face table is indexed by this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    Front,
    Back,
    Top,
    Bottom,
    Right,
    Left,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::Front,
        CubeFace::Back,
        CubeFace::Top,
        CubeFace::Bottom,
        CubeFace::Right,
        CubeFace::Left,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Face-local UVs for the four corners of a face, in vertex order
/// (bottom-left, bottom-right, top-right, top-left as seen from inside).
pub type FaceUvs = [[f32; 2]; 4];

const DEFAULT_FACE_UVS: FaceUvs = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackingScheme {
    /// 3 columns x 2 rows.
    Grid3x2,
    /// Six faces side by side in face order.
    Strip6x1,
    /// Six faces stacked top to bottom in face order.
    Strip1x6,
}

impl PackingScheme {
    pub fn layout(self) -> AtlasLayout {
        match self {
            PackingScheme::Grid3x2 => AtlasLayout {
                face_uvs: [DEFAULT_FACE_UVS; 6],
                // front, back, top, bottom, right, left
                face_offsets: [
                    [1.0 / 3.0, 0.5],
                    [2.0 / 3.0, 0.5],
                    [2.0 / 3.0, 0.0],
                    [0.0, 0.5],
                    [0.0, 0.0],
                    [1.0 / 3.0, 0.0],
                ],
                scale: [1.0 / 3.0, 0.5],
            },
            PackingScheme::Strip6x1 => {
                let mut face_offsets = [[0.0; 2]; 6];
                for face in CubeFace::ALL {
                    face_offsets[face.index()] = [face.index() as f32 / 6.0, 0.0];
                }
                AtlasLayout {
                    face_uvs: [DEFAULT_FACE_UVS; 6],
                    face_offsets,
                    scale: [1.0 / 6.0, 1.0],
                }
            }
            PackingScheme::Strip1x6 => {
                let mut face_offsets = [[0.0; 2]; 6];
                for face in CubeFace::ALL {
                    face_offsets[face.index()] = [0.0, face.index() as f32 / 6.0];
                }
                AtlasLayout {
                    face_uvs: [DEFAULT_FACE_UVS; 6],
                    face_offsets,
                    scale: [1.0, 1.0 / 6.0],
                }
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PackingScheme::Grid3x2 => "grid3x2",
            PackingScheme::Strip6x1 => "strip6x1",
            PackingScheme::Strip1x6 => "strip1x6",
        }
    }
}

impl fmt::Display for PackingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PackingScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid3x2" | "grid-3x2" | "3x2" => Ok(PackingScheme::Grid3x2),
            "strip6x1" | "strip-6x1" | "6x1" => Ok(PackingScheme::Strip6x1),
            "strip1x6" | "strip-1x6" | "1x6" => Ok(PackingScheme::Strip1x6),
            other => Err(ConfigError::UnknownValue {
                flag: "--layout",
                value: other.to_string(),
            }),
        }
    }
}

/// Per-face tables plus the scale the shader applies to face UVs before
/// adding the face offset: `atlas_uv = offset + uv * scale`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AtlasLayout {
    #[serde(default = "default_face_uvs")]
    pub face_uvs: [FaceUvs; 6],
    pub face_offsets: [[f32; 2]; 6],
    pub scale: [f32; 2],
}

fn default_face_uvs() -> [FaceUvs; 6] {
    [DEFAULT_FACE_UVS; 6]
}

impl AtlasLayout {
    pub fn face_offset(&self, face: CubeFace) -> [f32; 2] {
        self.face_offsets[face.index()]
    }

    /// Rejects layouts whose face rectangles leave the unit atlas.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [sx, sy] = self.scale;
        if !(sx > 0.0 && sx <= 1.0 && sy > 0.0 && sy <= 1.0) {
            return Err(ConfigError::InvalidLayout(format!(
                "scale ({sx}, {sy}) must be within (0, 1]"
            )));
        }

        const EPS: f32 = 1e-4;
        for face in CubeFace::ALL {
            let [ox, oy] = self.face_offset(face);
            if ox < -EPS || oy < -EPS || ox + sx > 1.0 + EPS || oy + sy > 1.0 + EPS {
                return Err(ConfigError::InvalidLayout(format!(
                    "{face:?} face rectangle at ({ox}, {oy}) exceeds the atlas"
                )));
            }
            for [u, v] in self.face_uvs[face.index()] {
                if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
                    return Err(ConfigError::InvalidLayout(format!(
                        "{face:?} face uv ({u}, {v}) outside [0, 1]"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for AtlasLayout {
    fn default() -> Self {
        PackingScheme::Grid3x2.layout()
    }
}

/// Either a built-in scheme name or a full custom table in the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LayoutChoice {
    Scheme(PackingScheme),
    Custom(AtlasLayout),
}

impl LayoutChoice {
    pub fn resolve(&self) -> Result<AtlasLayout, ConfigError> {
        match self {
            LayoutChoice::Scheme(scheme) => Ok(scheme.layout()),
            LayoutChoice::Custom(layout) => {
                layout.validate()?;
                Ok(layout.clone())
            }
        }
    }
}

impl Default for LayoutChoice {
    fn default() -> Self {
        LayoutChoice::Scheme(PackingScheme::Grid3x2)
    }
}
