//! Turns an attachment list and a subpass list into the pieces of a
//! `VkRenderPassCreateInfo`: attachment descriptions, per-subpass reference
//! lists and the dependency chain between subpasses.
//!
//! Compilation is independent of any device so the resulting layout can be
//! inspected directly.

use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::config::{CLEAR_COLOR, CLEAR_DEPTH, CLEAR_STENCIL};
use crate::renderer::resources::attachment::AttachmentRole;

/// One attachment of a render pass
#[derive(Debug, Clone, Copy)]
pub struct AttachmentSpec {
    pub format: vk::Format,
    pub role: AttachmentRole,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}

impl AttachmentSpec {
    pub fn new(
        format: vk::Format,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
    ) -> Self {
        Self {
            format,
            role: AttachmentRole::from_format(format),
            load_op,
            store_op,
        }
    }
}

/// One subpass, as indices into the attachment list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubpassSpec {
    pub render_targets: Vec<u32>,
    pub inputs: Vec<u32>,
}

impl SubpassSpec {
    pub fn new(render_targets: &[u32], inputs: &[u32]) -> Self {
        Self {
            render_targets: render_targets.to_vec(),
            inputs: inputs.to_vec(),
        }
    }
}

/// Attachment references of one subpass, split by how the subpass uses them
#[derive(Debug, Clone, Default)]
pub struct SubpassReferences {
    pub color: Vec<vk::AttachmentReference>,
    pub input: Vec<vk::AttachmentReference>,
    pub depth: Option<vk::AttachmentReference>,
}

impl SubpassReferences {
    /// Only non-empty reference lists are exposed to the driver.
    pub fn description(&self) -> vk::SubpassDescription<'_> {
        let mut description = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS);
        if !self.color.is_empty() {
            description = description.color_attachments(&self.color);
        }
        if !self.input.is_empty() {
            description = description.input_attachments(&self.input);
        }
        if let Some(depth) = self.depth.as_ref() {
            description = description.depth_stencil_attachment(depth);
        }
        description
    }
}

#[derive(Debug, Clone)]
pub struct CompiledRenderPass {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub roles: Vec<AttachmentRole>,
    pub subpasses: Vec<SubpassReferences>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

impl CompiledRenderPass {
    pub fn compile(attachments: &[AttachmentSpec], subpasses: &[SubpassSpec]) -> Result<Self> {
        if subpasses.is_empty() {
            return Err(eyre!("A render pass needs at least one subpass"));
        }

        let descriptions = attachments
            .iter()
            .map(describe_attachment)
            .collect::<Vec<_>>();
        let roles = attachments.iter().map(|a| a.role).collect::<Vec<_>>();

        let references = subpasses
            .iter()
            .enumerate()
            .map(|(i, subpass)| partition_references(i, subpass, &roles))
            .collect::<Result<Vec<_>>>()?;

        let dependencies = dependency_chain(subpasses.len() as u32);

        log::debug!(
            "Compiled render pass: {} attachments, {} subpasses, {} dependencies",
            descriptions.len(),
            references.len(),
            dependencies.len(),
        );

        Ok(Self {
            attachments: descriptions,
            roles,
            subpasses: references,
            dependencies,
        })
    }

    pub fn subpass_descriptions(&self) -> Vec<vk::SubpassDescription<'_>> {
        self.subpasses
            .iter()
            .map(SubpassReferences::description)
            .collect()
    }

    /// One clear value per attachment, in attachment order
    pub fn clear_values(&self) -> Vec<vk::ClearValue> {
        self.roles.iter().map(|role| clear_value(*role)).collect()
    }

    pub fn color_attachment_count(&self, subpass: u32) -> usize {
        self.subpasses
            .get(subpass as usize)
            .map_or(0, |refs| refs.color.len())
    }
}

/// Single-subpass pass that renders straight into a swapchain image: color is
/// left ready for presentation and depth is discarded.
pub fn compile_presentation(
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<CompiledRenderPass> {
    let attachments = [
        AttachmentSpec::new(color_format, vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE),
        AttachmentSpec::new(depth_format, vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::DONT_CARE),
    ];
    let mut compiled = CompiledRenderPass::compile(&attachments, &[SubpassSpec::new(&[0, 1], &[])])?;
    compiled.attachments[0].final_layout = vk::ImageLayout::PRESENT_SRC_KHR;
    compiled.attachments[1].final_layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
    Ok(compiled)
}

fn describe_attachment(spec: &AttachmentSpec) -> vk::AttachmentDescription {
    let (stencil_load_op, stencil_store_op) = match spec.role {
        AttachmentRole::DepthStencil { has_stencil: true } => (spec.load_op, spec.store_op),
        _ => (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE),
    };
    vk::AttachmentDescription::default()
        .format(spec.format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(spec.load_op)
        .store_op(spec.store_op)
        .stencil_load_op(stencil_load_op)
        .stencil_store_op(stencil_store_op)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(spec.role.final_layout())
}

fn partition_references(
    subpass_index: usize,
    subpass: &SubpassSpec,
    roles: &[AttachmentRole],
) -> Result<SubpassReferences> {
    let mut references = SubpassReferences::default();

    let targets = subpass.render_targets.iter().map(|i| (*i, true));
    let inputs = subpass.inputs.iter().map(|i| (*i, false));

    for (index, is_target) in targets.chain(inputs) {
        let role = roles.get(index as usize).ok_or_else(|| {
            eyre!(
                "Subpass {} references attachment {} but only {} exist",
                subpass_index,
                index,
                roles.len(),
            )
        })?;

        // Depth/stencil is always bound as the subpass's depth attachment, whether
        // it was listed as a target or as an input.
        if role.is_depth_stencil() {
            if let Some(previous) = references.depth {
                log::warn!(
                    "Subpass {} lists depth attachments {} and {}; keeping {}",
                    subpass_index,
                    previous.attachment,
                    index,
                    index,
                );
            }
            references.depth = Some(vk::AttachmentReference {
                attachment: index,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            });
        } else if is_target {
            references.color.push(vk::AttachmentReference {
                attachment: index,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            });
        } else {
            references.input.push(vk::AttachmentReference {
                attachment: index,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            });
        }
    }

    Ok(references)
}

/// The synchronization chain for `subpass_count` subpasses executed in order:
/// an entry edge from outside the pass, one edge per consecutive pair, and an
/// exit edge.
pub fn dependency_chain(subpass_count: u32) -> Vec<vk::SubpassDependency> {
    if subpass_count == 0 {
        return Vec::new();
    }

    let mut dependencies = Vec::with_capacity(subpass_count as usize + 1);
    dependencies.push(entry_dependency());
    for dst in 1..subpass_count {
        dependencies.push(
            vk::SubpassDependency::default()
                .src_subpass(dst - 1)
                .dst_subpass(dst)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .dependency_flags(vk::DependencyFlags::BY_REGION),
        );
    }
    dependencies.push(exit_dependency(subpass_count - 1));
    dependencies
}

fn entry_dependency() -> vk::SubpassDependency {
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
        .dependency_flags(vk::DependencyFlags::BY_REGION)
}

fn exit_dependency(last_subpass: u32) -> vk::SubpassDependency {
    // Later passes sample the results, so reads anywhere after the pass wait on
    // both color and depth writes
    vk::SubpassDependency::default()
        .src_subpass(last_subpass)
        .dst_subpass(vk::SUBPASS_EXTERNAL)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        )
        .src_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ
                | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
        .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
        .dst_access_mask(vk::AccessFlags::MEMORY_READ)
        .dependency_flags(vk::DependencyFlags::BY_REGION)
}

pub fn clear_value(role: AttachmentRole) -> vk::ClearValue {
    match role {
        AttachmentRole::DepthStencil { .. } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: CLEAR_DEPTH,
                stencil: CLEAR_STENCIL,
            },
        },
        AttachmentRole::Color => vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        },
    }
}

pub fn render_area(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAR: vk::AttachmentLoadOp = vk::AttachmentLoadOp::CLEAR;
    const STORE: vk::AttachmentStoreOp = vk::AttachmentStoreOp::STORE;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn color() -> AttachmentSpec {
        AttachmentSpec::new(vk::Format::R16G16B16A16_SFLOAT, CLEAR, STORE)
    }

    fn depth() -> AttachmentSpec {
        AttachmentSpec::new(vk::Format::D32_SFLOAT, CLEAR, STORE)
    }

    /// albedo, position, normal, material, depth, output, emissive
    fn deferred() -> CompiledRenderPass {
        let attachments = [color(), color(), color(), color(), depth(), color(), color()];
        let subpasses = [
            SubpassSpec::new(&[0, 1, 2, 3, 4], &[]),
            SubpassSpec::new(&[5], &[0, 1, 2, 3]),
            SubpassSpec::new(&[5, 6], &[4]),
        ];
        CompiledRenderPass::compile(&attachments, &subpasses).unwrap()
    }

    #[test]
    fn test_single_subpass_has_two_dependencies() {
        let compiled = CompiledRenderPass::compile(
            &[color(), depth()],
            &[SubpassSpec::new(&[0, 1], &[])],
        )
        .unwrap();
        let deps = &compiled.dependencies;
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(deps[0].dst_subpass, 0);
        assert_eq!(deps[0].src_access_mask, vk::AccessFlags::empty());
        assert_eq!(
            deps[0].dst_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );
        assert_eq!(deps[1].src_subpass, 0);
        assert_eq!(deps[1].dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(deps[1].dst_access_mask, vk::AccessFlags::MEMORY_READ);
    }

    #[test]
    fn test_depth_only_pass_makes_depth_writes_available() {
        let compiled = CompiledRenderPass::compile(
            &[depth()],
            &[SubpassSpec::new(&[0], &[])],
        )
        .unwrap();
        assert!(compiled.subpasses[0].color.is_empty());
        assert!(compiled.subpasses[0].depth.is_some());

        let exit = compiled.dependencies.last().unwrap();
        assert_eq!(exit.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert!(exit.src_stage_mask.contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
        assert!(exit.src_access_mask.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(exit.src_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert_eq!(exit.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_multi_subpass_chain() {
        for n in 2..6u32 {
            let deps = dependency_chain(n);
            assert_eq!(deps.len(), n as usize + 1);
            for i in 1..n as usize {
                assert_eq!(deps[i].src_subpass, i as u32 - 1);
                assert_eq!(deps[i].dst_subpass, i as u32);
                assert_eq!(deps[i].dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
                assert_eq!(deps[i].dst_access_mask, vk::AccessFlags::SHADER_READ);
            }
            assert_eq!(deps[n as usize].src_subpass, n - 1);
            assert_eq!(deps[n as usize].dst_subpass, vk::SUBPASS_EXTERNAL);
        }
    }

    #[test]
    fn test_every_dependency_is_by_region() {
        for n in 1..4 {
            assert!(dependency_chain(n)
                .iter()
                .all(|d| d.dependency_flags == vk::DependencyFlags::BY_REGION));
        }
    }

    #[test]
    fn test_attachment_descriptions() {
        let compiled = deferred();
        assert!(compiled
            .attachments
            .iter()
            .all(|a| a.initial_layout == vk::ImageLayout::UNDEFINED));
        assert_eq!(
            compiled.attachments[4].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        );
        assert_eq!(
            compiled.attachments[0].final_layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(compiled.attachments[0].format, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(compiled.attachments[0].load_op, CLEAR);
        assert_eq!(compiled.attachments[0].store_op, STORE);
    }

    #[test]
    fn test_deferred_pipeline_partitions() {
        let compiled = deferred();
        assert_eq!(compiled.subpasses.len(), 3);
        assert_eq!(compiled.dependencies.len(), 4);

        let gbuffer = &compiled.subpasses[0];
        assert_eq!(gbuffer.color.len(), 4);
        assert!(gbuffer.input.is_empty());
        let depth_index = gbuffer.depth.unwrap().attachment;
        assert_eq!(depth_index, 4);

        let lighting = &compiled.subpasses[1];
        assert_eq!(lighting.input.len(), 4);
        assert_eq!(lighting.color.len(), 1);
        assert!(lighting.depth.is_none());

        let forward = &compiled.subpasses[2];
        assert_eq!(forward.depth.unwrap().attachment, depth_index);
        assert_eq!(forward.color.len(), 2);
        assert!(forward.input.is_empty());
    }

    #[test]
    fn test_subpass_description_exposes_only_non_empty_lists() {
        let compiled = deferred();
        let descriptions = compiled.subpass_descriptions();
        assert_eq!(descriptions.len(), 3);

        assert_eq!(descriptions[0].color_attachment_count, 4);
        assert_eq!(descriptions[0].input_attachment_count, 0);
        assert!(descriptions[0].p_input_attachments.is_null());
        assert!(!descriptions[0].p_depth_stencil_attachment.is_null());

        assert_eq!(descriptions[1].input_attachment_count, 4);
        assert_eq!(descriptions[1].color_attachment_count, 1);
        assert!(descriptions[1].p_depth_stencil_attachment.is_null());
    }

    #[test]
    fn test_depth_never_lands_in_color_or_input_lists() {
        let compiled = deferred();
        for (index, role) in compiled.roles.iter().enumerate() {
            if !role.is_depth_stencil() {
                continue;
            }
            for subpass in &compiled.subpasses {
                let index = index as u32;
                assert!(subpass.color.iter().all(|r| r.attachment != index));
                assert!(subpass.input.iter().all(|r| r.attachment != index));
            }
        }
    }

    #[test]
    fn test_target_then_input_needs_no_special_case() {
        let compiled = CompiledRenderPass::compile(
            &[color(), color()],
            &[SubpassSpec::new(&[0], &[]), SubpassSpec::new(&[1], &[0])],
        )
        .unwrap();
        assert_eq!(compiled.subpasses[0].color[0].attachment, 0);
        assert_eq!(compiled.subpasses[1].input[0].attachment, 0);
        assert_eq!(
            compiled.subpasses[1].input[0].layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }

    #[test]
    fn test_later_depth_reference_wins() {
        init_logger();
        let compiled = CompiledRenderPass::compile(
            &[color(), depth(), depth()],
            &[SubpassSpec::new(&[0, 1], &[2])],
        )
        .unwrap();
        assert_eq!(compiled.subpasses[0].depth.map(|d| d.attachment), Some(2));
        assert_eq!(compiled.subpasses[0].color.len(), 1);
        assert!(compiled.subpasses[0].input.is_empty());
    }

    #[test]
    fn test_out_of_range_reference_is_rejected() {
        init_logger();
        let result = CompiledRenderPass::compile(&[color()], &[SubpassSpec::new(&[0, 3], &[])]);
        assert!(result.is_err());
        assert!(CompiledRenderPass::compile(&[color()], &[]).is_err());
    }

    #[test]
    fn test_offscreen_clear_values_and_area() {
        let compiled = CompiledRenderPass::compile(
            &[color(), depth()],
            &[SubpassSpec::new(&[0, 1], &[])],
        )
        .unwrap();
        let clears = compiled.clear_values();
        assert_eq!(clears.len(), 2);
        unsafe {
            assert_eq!(clears[0].color.float32, [0.01, 0.01, 0.01, 1.0]);
            assert_eq!(clears[1].depth_stencil.depth, 1.0);
            assert_eq!(clears[1].depth_stencil.stencil, 0);
        }

        let extent = vk::Extent2D { width: 800, height: 600 };
        let area = render_area(extent);
        assert_eq!(area.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(area.extent, extent);

        let viewport = full_viewport(extent);
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn test_stencil_ops_follow_role() {
        let with_stencil = AttachmentSpec::new(vk::Format::D24_UNORM_S8_UINT, CLEAR, STORE);
        let compiled = CompiledRenderPass::compile(
            &[with_stencil, depth()],
            &[SubpassSpec::new(&[0], &[]), SubpassSpec::new(&[1], &[])],
        )
        .unwrap();
        assert_eq!(compiled.attachments[0].stencil_load_op, CLEAR);
        assert_eq!(compiled.attachments[1].stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn test_presentation_pass_ends_in_present_layout() {
        let compiled = compile_presentation(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT).unwrap();
        assert_eq!(compiled.attachments.len(), 2);
        assert_eq!(compiled.attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(compiled.attachments[1].store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(compiled.subpasses.len(), 1);
        assert_eq!(compiled.subpasses[0].color.len(), 1);
        assert_eq!(compiled.subpasses[0].depth.map(|d| d.attachment), Some(1));
        assert_eq!(compiled.dependencies.len(), 2);
    }
}
