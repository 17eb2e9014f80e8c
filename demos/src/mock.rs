use {
    gpu_slot::{
        BindingCache, BindingParam, Config, LayoutEntry, PipelineLayout, SlotAllocator, SlotKind,
        SubresourceRange, TextureView, ViewDesc,
    },
    gpu_slot_mock::{MockCommandList, MockSlotDevice},
    std::sync::Arc,
};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let device = MockSlotDevice::with_defaults();

    let config = Config::i_am_potato();

    let mut allocator = SlotAllocator::new(config, device.props());

    let subresources = SubresourceRange::whole(1, 1);
    let mut texture = unsafe {
        allocator.create_view(
            &device,
            &ViewDesc::Texture(TextureView {
                texture: 1,
                subresources,
            }),
        )
    }?;

    let mut sampler = unsafe { allocator.create_view(&device, &ViewDesc::Sampler(1)) }?;

    let layout = Arc::new(PipelineLayout::new(vec![
        LayoutEntry {
            set: 0,
            binding: 0,
            kind: SlotKind::Resource,
        },
        LayoutEntry {
            set: 0,
            binding: 1,
            kind: SlotKind::Sampler,
        },
    ]));

    let mut cache = BindingCache::new();
    let mut commands = MockCommandList::new();

    cache.bind(&layout);
    cache.set_param(
        0,
        0,
        BindingParam::Texture {
            view: texture,
            subresources,
        },
    )?;
    cache.set_param(0, 1, BindingParam::Sampler(sampler))?;

    unsafe { cache.prepare_for_draw(&device, &mut allocator, &mut commands) }?;

    for binding in commands.bindings() {
        println!(
            "root parameter {} <- {:?} table at {:?}",
            binding.root_parameter, binding.kind, binding.base
        );
    }

    allocator.free_slot(SlotKind::Resource, &mut texture);
    allocator.free_slot(SlotKind::Sampler, &mut sampler);

    unsafe { allocator.cleanup(&device) }

    Ok(())
}
