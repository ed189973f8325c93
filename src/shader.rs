// shader.rs - WGSL source for the cube program

/// A shader program as handed to the pipeline builder.
#[derive(Debug, Clone, Copy)]
pub struct ShaderProgram {
    pub label: &'static str,
    pub source: &'static str,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
}

pub fn cube_program() -> ShaderProgram {
    ShaderProgram {
        label: "cube_shader",
        source: include_str!("shader_cube.wgsl"),
        vertex_entry: "vs_main",
        fragment_entry: "fs_main",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_points_exist_in_source() {
        let program = cube_program();
        assert!(program.source.contains(&format!("fn {}(", program.vertex_entry)));
        assert!(program.source.contains(&format!("fn {}(", program.fragment_entry)));
    }

    #[test]
    fn vertex_locations_match_mesh_buffers() {
        let source = cube_program().source;
        for location in ["@location(0) position", "@location(1) face_uv", "@location(2) face_offset"] {
            assert!(source.contains(location), "missing {location}");
        }
    }
}
