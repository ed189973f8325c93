// mesh.rs - unit cube seen from the inside, one quad per atlas face

use crate::atlas::{AtlasLayout, CubeFace};

pub const VERTEX_COUNT: usize = 24;
pub const INDEX_COUNT: usize = 36;

// Corner positions per face in `CubeFace::ALL` order. Each quad winds
// counter-clockwise when viewed from the cube's centre.
const FACE_POSITIONS: [[[f32; 3]; 4]; 6] = [
    // front
    [[-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [-1.0, 1.0, -1.0]],
    // back
    [[1.0, -1.0, 1.0], [-1.0, -1.0, 1.0], [-1.0, 1.0, 1.0], [1.0, 1.0, 1.0]],
    // top
    [[-1.0, 1.0, -1.0], [1.0, 1.0, -1.0], [1.0, 1.0, 1.0], [-1.0, 1.0, 1.0]],
    // bottom
    [[-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [1.0, -1.0, -1.0], [-1.0, -1.0, -1.0]],
    // right
    [[1.0, -1.0, -1.0], [1.0, -1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, -1.0]],
    // left
    [[-1.0, -1.0, 1.0], [-1.0, -1.0, -1.0], [-1.0, 1.0, -1.0], [-1.0, 1.0, 1.0]],
];

/// CPU-side cube geometry. Attributes live in separate arrays because the
/// renderer binds one vertex buffer per attribute.
#[derive(Debug, Clone)]
pub struct CubeMesh {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub uv_offsets: Vec<[f32; 2]>,
    pub indices: Vec<u16>,
}

impl CubeMesh {
    pub fn build(layout: &AtlasLayout) -> Self {
        let mut positions = Vec::with_capacity(VERTEX_COUNT);
        let mut uvs = Vec::with_capacity(VERTEX_COUNT);
        let mut uv_offsets = Vec::with_capacity(VERTEX_COUNT);
        let mut indices = Vec::with_capacity(INDEX_COUNT);

        for face in CubeFace::ALL {
            let base = positions.len() as u16;
            let offset = layout.face_offset(face);

            for (corner, uv) in FACE_POSITIONS[face.index()]
                .iter()
                .zip(layout.face_uvs[face.index()].iter())
            {
                positions.push(*corner);
                uvs.push(*uv);
                uv_offsets.push(offset);
            }

            indices.extend_from_slice(&[
                base, base + 1, base + 2,
                base, base + 2, base + 3,
            ]);
        }

        Self {
            positions,
            uvs,
            uv_offsets,
            indices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}
