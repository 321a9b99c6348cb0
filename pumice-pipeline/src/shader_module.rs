//! Shader-module objects: verbatim copies of the caller's SPIR-V words,
//! addressable through `VkShaderModule` handles.
use ash::vk::{self, Handle};

use pumice_shader::{Error, Result};

/// An owned copy of a shader module's SPIR-V words. The bytes may be freed
/// by the caller right after creation; translation works from this copy.
pub struct ShaderModule {
    words: Vec<u32>,
}

impl ShaderModule {
    /// Copies `codeSize` bytes out of the create-info struct.
    ///
    /// # Safety
    /// `create_info.p_code` must point at `code_size` readable bytes, as the
    /// Vulkan API contract requires.
    pub unsafe fn create(create_info: &vk::ShaderModuleCreateInfo) -> Result<ShaderModule> {
        assert_eq!(create_info.s_type, vk::StructureType::SHADER_MODULE_CREATE_INFO);
        if create_info.code_size == 0 || create_info.code_size % 4 != 0 {
            return Err(Error::parser(
                0,
                "shader module code size must be a non-zero multiple of four bytes",
            ));
        }
        let words =
            std::slice::from_raw_parts(create_info.p_code, create_info.code_size / 4).to_vec();
        Ok(ShaderModule { words })
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Moves the module behind a `VkShaderModule` handle.
    pub fn into_handle(module: Box<ShaderModule>) -> vk::ShaderModule {
        vk::ShaderModule::from_raw(Box::into_raw(module) as u64)
    }

    /// Borrows the module behind a handle; `None` for the null handle.
    ///
    /// # Safety
    /// `handle` must have come from [`into_handle`](Self::into_handle) and
    /// still be live.
    pub unsafe fn from_handle_ref<'h>(handle: vk::ShaderModule) -> Option<&'h ShaderModule> {
        (handle.as_raw() as *const ShaderModule).as_ref()
    }

    /// Reclaims ownership from a handle, destroying the module on drop.
    ///
    /// # Safety
    /// `handle` must have come from [`into_handle`](Self::into_handle) and
    /// must not be used afterwards.
    pub unsafe fn from_handle(handle: vk::ShaderModule) -> Box<ShaderModule> {
        Box::from_raw(handle.as_raw() as *mut ShaderModule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_roundtrip() {
        let module = Box::new(ShaderModule {
            words: vec![1, 2, 3],
        });
        let handle = ShaderModule::into_handle(module);
        let borrowed = unsafe { ShaderModule::from_handle_ref(handle) }.unwrap();
        assert_eq!(borrowed.words(), &[1, 2, 3]);
        let owned = unsafe { ShaderModule::from_handle(handle) };
        assert_eq!(owned.words(), &[1, 2, 3]);
    }

    #[test]
    fn misaligned_code_size_is_rejected() {
        let words = [0u32; 4];
        let create_info = vk::ShaderModuleCreateInfo {
            code_size: 13,
            p_code: words.as_ptr(),
            ..Default::default()
        };
        assert!(unsafe { ShaderModule::create(&create_info) }.is_err());
    }
}
