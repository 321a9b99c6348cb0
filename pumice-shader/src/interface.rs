//! Vertex-input descriptions and the vertex-format table.
use ash::vk;

use crate::error::{Error, Result};
use crate::ty::{Type, TypeKind, TypeRef};

/// Safe carrier of the two description arrays the vertex entry point reads
/// from `VkPipelineVertexInputStateCreateInfo`.
#[derive(Debug, Default, Clone)]
pub struct VertexInputState {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInputState {
    /// Copies the description arrays out of the create-info struct.
    ///
    /// # Safety
    /// The pointer/count pairs in `info` must be valid, as required by the
    /// Vulkan API contract.
    pub unsafe fn from_create_info(info: &vk::PipelineVertexInputStateCreateInfo) -> Self {
        assert_eq!(
            info.s_type,
            vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO
        );
        let bindings = if info.vertex_binding_description_count == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(
                info.p_vertex_binding_descriptions,
                info.vertex_binding_description_count as usize,
            )
            .to_vec()
        };
        let attributes = if info.vertex_attribute_description_count == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(
                info.p_vertex_attribute_descriptions,
                info.vertex_attribute_description_count as usize,
            )
            .to_vec()
        };
        VertexInputState {
            bindings,
            attributes,
        }
    }

    pub fn binding(&self, binding: u32) -> Option<&vk::VertexInputBindingDescription> {
        self.bindings.iter().find(|desc| desc.binding == binding)
    }
}

/// In-memory shape of a vertex attribute format, as a type descriptor. The
/// synthesized load reinterprets the attribute bytes as this type; the table
/// can grow without touching the entry-point algorithm.
pub fn vertex_format_type(format: vk::Format) -> Result<TypeRef> {
    let f32_ty = Type::new(TypeKind::Float { width: 32 }, 0);
    match format {
        vk::Format::R32G32B32_SFLOAT => Ok(Type::new(
            TypeKind::Vector {
                element: f32_ty,
                count: 3,
            },
            0,
        )),
        vk::Format::R32G32B32A32_SFLOAT => Ok(Type::new(
            TypeKind::Vector {
                element: f32_ty,
                count: 4,
            },
            0,
        )),
        other => Err(Error::unsupported(format!(
            "unimplemented vertex input format: {:?}",
            other
        ))),
    }
}
