use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use naga::back::spv;
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use crate::renderer::contexts::device_ctx::device::RenderDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Guesses the stage from a `.vert` / `.frag` / `.comp` extension, also
    /// looking through a trailing `.spv`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let name = name.strip_suffix(".spv").unwrap_or(name);
        match Path::new(name).extension()?.to_str()? {
            "vert" => Some(Self::Vertex),
            "frag" => Some(Self::Fragment),
            "comp" => Some(Self::Compute),
            _ => None,
        }
    }

    pub fn vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            Self::Vertex => naga::ShaderStage::Vertex,
            Self::Fragment => naga::ShaderStage::Fragment,
            Self::Compute => naga::ShaderStage::Compute,
        }
    }
}

/// Turns a shader source on disk into SPIR-V words
pub trait ShaderCompiler {
    fn compile(&self, path: &Path, stage: ShaderStage) -> Result<Vec<u32>>;
}

/// Loads SPIR-V that was compiled ahead of time
#[derive(Debug, Default, Clone, Copy)]
pub struct SpirvFileLoader;

impl ShaderCompiler for SpirvFileLoader {
    fn compile(&self, path: &Path, _stage: ShaderStage) -> Result<Vec<u32>> {
        let bytes = std::fs::read(path)
            .wrap_err_with(|| format!("Failed to read shader {:?}", path))?;
        spirv_words(&bytes).wrap_err_with(|| format!("Invalid SPIR-V in {:?}", path))
    }
}

/// Compiles GLSL at runtime through naga
#[derive(Debug, Default, Clone, Copy)]
pub struct GlslCompiler;

impl GlslCompiler {
    pub fn compile_source(&self, source: &str, stage: ShaderStage) -> Result<Vec<u32>> {
        let mut frontend = Frontend::default();
        let module = frontend
            .parse(&Options::from(stage.naga_stage()), source)
            .map_err(|parse_errors| {
                for err in &parse_errors.errors {
                    log::error!("GLSL: {}", err);
                }
                eyre!("Shader compilation failed with {} error(s)", parse_errors.errors.len())
            })?;

        let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
        let info = validator.validate(&module).map_err(|err| {
            log::error!("Shader validation: {}", err);
            eyre!("Shader compilation failed with 1 error(s)")
        })?;

        let words = spv::write_vec(&module, &info, &spv::Options::default(), None)?;
        Ok(words)
    }
}

impl ShaderCompiler for GlslCompiler {
    fn compile(&self, path: &Path, stage: ShaderStage) -> Result<Vec<u32>> {
        let source = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read shader {:?}", path))?;
        self.compile_source(&source, stage)
            .wrap_err_with(|| format!("Failed to compile {:?}", path))
    }
}

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Reinterprets a little-endian SPIR-V blob as words and checks the magic number.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(eyre!("SPIR-V size {} is not a multiple of 4", bytes.len()));
    }
    let words = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect::<Vec<_>>();
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(eyre!("Bad SPIR-V magic number {:#010x}", other)),
        None => Err(eyre!("SPIR-V blob is empty")),
    }
}

pub struct ShaderModule {
    pub module: vk::ShaderModule,
    pub stage: ShaderStage,
    device: Arc<ash::Device>,
}

impl ShaderModule {
    pub fn new(dev: &RenderDevice, code: &[u32], stage: ShaderStage) -> Result<Self> {
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { dev.logical.create_shader_module(&info, None)? };

        Ok(Self {
            module,
            stage,
            device: dev.logical.clone(),
        })
    }

    /// Compiles `path` with `compiler`; the stage comes from the file name.
    pub fn from_file(
        dev: &RenderDevice,
        compiler: &dyn ShaderCompiler,
        path: &Path,
    ) -> Result<Self> {
        let stage = ShaderStage::from_path(path)
            .ok_or_else(|| eyre!("Cannot tell the shader stage of {:?}", path))?;
        let code = compiler.compile(path, stage)?;
        Self::new(dev, &code, stage)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE_VERT: &str = r#"
        #version 450
        layout(location = 0) in vec3 in_position;
        void main() {
            gl_Position = vec4(in_position, 1.0);
        }
    "#;

    #[test]
    fn test_stage_from_path() {
        assert_eq!(ShaderStage::from_path(Path::new("shaders/mesh.vert")), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_path(Path::new("mesh.frag.spv")), Some(ShaderStage::Fragment));
        assert_eq!(ShaderStage::from_path(Path::new("cull.comp")), Some(ShaderStage::Compute));
        assert_eq!(ShaderStage::from_path(Path::new("notes.txt")), None);
        assert_eq!(ShaderStage::from_path(Path::new("mesh")), None);
    }

    #[test]
    fn test_glsl_compiles_to_spirv() {
        let words = GlslCompiler.compile_source(TRIANGLE_VERT, ShaderStage::Vertex).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_glsl_errors_are_counted() {
        let err = GlslCompiler
            .compile_source("#version 450\nvoid main() { undefined_call(); }", ShaderStage::Fragment)
            .unwrap_err();
        assert!(err.to_string().contains("error(s)"));
    }

    #[test]
    fn test_spirv_words_checks_magic_and_alignment() {
        let mut blob = SPIRV_MAGIC.to_le_bytes().to_vec();
        blob.extend_from_slice(&[1, 0, 0, 0]);
        assert_eq!(spirv_words(&blob).unwrap(), vec![SPIRV_MAGIC, 1]);

        assert!(spirv_words(&[0u8; 6]).is_err());
        assert!(spirv_words(&[0u8; 8]).is_err());
        assert!(spirv_words(&[]).is_err());
    }

    #[test]
    fn test_spirv_loader_round_trips_compiled_glsl() {
        let words = GlslCompiler.compile_source(TRIANGLE_VERT, ShaderStage::Vertex).unwrap();
        let path = std::env::temp_dir().join(format!("strata-test-{}.vert.spv", std::process::id()));
        std::fs::write(&path, bytemuck::cast_slice::<u32, u8>(&words)).unwrap();
        let loaded = SpirvFileLoader.compile(&path, ShaderStage::Vertex).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, words);
    }
}
