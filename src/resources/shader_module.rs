use crate::{context::Device, error::ShaderError};
use std::{ffi::CStr, io::Cursor, path::Path, sync::Arc};

use ash::vk;

///Default shader entry point name.
pub const DEFAULT_ENTRY: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

///Single shader module created from SPIR-V code.
pub struct ShaderModule {
    pub device: Arc<Device>,
    pub module: ash::vk::ShaderModule,
}

impl ShaderModule {
    ///Reads the file at `path` and tries to create the shader module from it. Fails when the
    /// file cannot be read, or is not valid SPIR-V (wrong magic number, size not a multiple of four).
    pub fn new_from_file(
        device: &Arc<Device>,
        file: impl AsRef<Path>,
    ) -> Result<Self, ShaderError> {
        let mut file = std::fs::File::open(file)?;
        let code = ash::util::read_spv(&mut file)?;

        Self::new(device, &code)
    }

    ///Creates the module from raw bytes, for instance shader code embedded via `include_bytes!`.
    /// Performs the same SPIR-V sanity checks as [new_from_file](Self::new_from_file).
    pub fn new_from_bytes(device: &Arc<Device>, bytes: &[u8]) -> Result<Self, ShaderError> {
        let mut cursor = Cursor::new(bytes);
        let code = ash::util::read_spv(&mut cursor)?;

        Self::new(device, &code)
    }

    pub fn new(device: &Arc<Device>, code: &[u32]) -> Result<Self, ShaderError> {
        let create_info = ash::vk::ShaderModuleCreateInfo::builder().code(code);

        let module = unsafe { device.inner.create_shader_module(&create_info, None)? };

        Ok(ShaderModule {
            device: device.clone(),
            module,
        })
    }

    ///Creates a shader stage from this module for the given `stage` and `entry` point.
    /// Use [DEFAULT_ENTRY] for the common `main` entry point.
    pub fn as_stage<'a>(
        &'a self,
        stage: ash::vk::ShaderStageFlags,
        entry: &'a CStr,
    ) -> ash::vk::PipelineShaderStageCreateInfoBuilder<'a> {
        vk::PipelineShaderStageCreateInfo::builder()
            .module(self.module)
            .stage(stage)
            .name(entry)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_shader_module(self.module, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(ShaderModule: Send, Sync);
    }

    #[test]
    fn default_entry_is_main() {
        assert_eq!(DEFAULT_ENTRY.to_str().unwrap(), "main");
    }
}
