use std::{env, error::Error, fs, path::PathBuf};

// Hard-coded triangle: positions and colours live in the shader, so the
// pipeline needs no vertex input.
const VS_SRC: &str = r#"
#version 450
layout(location = 0) out vec3 vColor;

const vec2 POS[3] = vec2[](vec2(0.0, -0.5), vec2(0.5, 0.5), vec2(-0.5, 0.5));
const vec3 COL[3] = vec3[](vec3(1.0, 0.2, 0.2), vec3(0.2, 1.0, 0.2), vec3(0.2, 0.2, 1.0));

void main() {
    vColor = COL[gl_VertexIndex];
    gl_Position = vec4(POS[gl_VertexIndex], 0.0, 1.0);
}
"#;

const FS_SRC: &str = r#"
#version 450
layout(location = 0) in vec3 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(vColor, 1.0);
}
"#;

fn main() -> Result<(), Box<dyn Error>> {
    let out = PathBuf::from(env::var("OUT_DIR")?);

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for (src, kind, name) in [
        (VS_SRC, shaderc::ShaderKind::Vertex, "tri.vert"),
        (FS_SRC, shaderc::ShaderKind::Fragment, "tri.frag"),
    ] {
        let spv = comp.compile_into_spirv(src, kind, name, "main", Some(&opts))?;
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8())?;
    }

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
