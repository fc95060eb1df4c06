use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

/// Access mask that must be made available before leaving `layout`.
pub fn src_access_mask(layout: vk::ImageLayout) -> Option<vk::AccessFlags> {
    layout_access_mask(layout)
}

/// Access mask the next user of `layout` performs.
pub fn dst_access_mask(layout: vk::ImageLayout) -> Option<vk::AccessFlags> {
    // Nothing may transition *into* UNDEFINED or PREINITIALIZED
    match layout {
        vk::ImageLayout::UNDEFINED | vk::ImageLayout::PREINITIALIZED => None,
        _ => layout_access_mask(layout),
    }
}

fn layout_access_mask(layout: vk::ImageLayout) -> Option<vk::AccessFlags> {
    let mask = match layout {
        vk::ImageLayout::UNDEFINED => vk::AccessFlags::empty(),
        vk::ImageLayout::PREINITIALIZED => vk::AccessFlags::HOST_WRITE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::AccessFlags::SHADER_READ,
        _ => return None,
    };
    Some(mask)
}

/// Pipeline stage that performs the accesses returned for `layout`.
pub fn stage_for_layout(layout: vk::ImageLayout) -> vk::PipelineStageFlags {
    match layout {
        vk::ImageLayout::UNDEFINED => vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::ImageLayout::PREINITIALIZED => vk::PipelineStageFlags::HOST,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => {
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        }
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL | vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            vk::PipelineStageFlags::TRANSFER
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::PipelineStageFlags::FRAGMENT_SHADER,
        _ => vk::PipelineStageFlags::ALL_COMMANDS,
    }
}

/// Builds the barrier for an `old -> new` transition over the whole image.
pub fn layout_transition_barrier(
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
    layer_count: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<vk::ImageMemoryBarrier<'static>> {
    let src_access = src_access_mask(old_layout)
        .ok_or_else(|| eyre!("Unsupported source layout for transition: {:?}", old_layout))?;
    let dst_access = dst_access_mask(new_layout)
        .ok_or_else(|| eyre!("Unsupported target layout for transition: {:?}", new_layout))?;

    Ok(vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access))
}

/// Records a layout transition into `cmd`.
#[allow(clippy::too_many_arguments)]
pub fn transition_image_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
    layer_count: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<()> {
    if old_layout == new_layout {
        return Ok(());
    }

    let barrier = layout_transition_barrier(
        image,
        aspect,
        mip_levels,
        layer_count,
        old_layout,
        new_layout,
    )?;

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            stage_for_layout(old_layout),
            stage_for_layout(new_layout),
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_table_is_exact() {
        let table = [
            (vk::ImageLayout::UNDEFINED, vk::AccessFlags::empty()),
            (vk::ImageLayout::PREINITIALIZED, vk::AccessFlags::HOST_WRITE),
            (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
            (
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::AccessFlags::TRANSFER_READ),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::AccessFlags::TRANSFER_WRITE),
            (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::AccessFlags::SHADER_READ),
        ];
        for (layout, access) in table {
            assert_eq!(src_access_mask(layout), Some(access), "{:?}", layout);
        }
    }

    #[test]
    fn test_cannot_transition_into_undefined() {
        assert_eq!(dst_access_mask(vk::ImageLayout::UNDEFINED), None);
        assert_eq!(dst_access_mask(vk::ImageLayout::PREINITIALIZED), None);
        assert_eq!(
            dst_access_mask(vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            Some(vk::AccessFlags::TRANSFER_WRITE),
        );
    }

    #[test]
    fn test_upload_barrier_pair() {
        let image = vk::Image::null();
        let to_transfer = layout_transition_barrier(
            image,
            vk::ImageAspectFlags::COLOR,
            4,
            1,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_transfer.src_access_mask, vk::AccessFlags::empty());
        assert_eq!(to_transfer.dst_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_transfer.subresource_range.level_count, 4);

        let to_shader = layout_transition_barrier(
            image,
            vk::ImageAspectFlags::COLOR,
            4,
            1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_shader.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_shader.dst_access_mask, vk::AccessFlags::SHADER_READ);
        assert_eq!(
            stage_for_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        );
    }

    #[test]
    fn test_unsupported_layout_is_an_error() {
        let result = layout_transition_barrier(
            vk::Image::null(),
            vk::ImageAspectFlags::COLOR,
            1,
            1,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert!(result.is_err());
    }
}
