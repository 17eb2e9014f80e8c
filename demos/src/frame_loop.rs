use {
    gpu_slot::{
        BindingCache, BindingParam, BufferView, Config, LayoutEntry, PipelineLayout,
        ResourceState, ResourceStateTracker, SlotAllocator, SlotKind, SubresourceRange,
        Subresources, TextureView, ViewDesc,
    },
    gpu_slot_mock::{MockCommandList, MockSlotDevice},
    std::{collections::VecDeque, sync::Arc},
    tracing_subscriber::layer::SubscriberExt as _,
};

const FRAMES: u64 = 1000;
const DRAWS_PER_FRAME: u64 = 64;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .pretty()
            .finish()
            .with(tracing_error::ErrorLayer::default()),
    )?;

    let device = MockSlotDevice::with_defaults();

    let config = Config::i_am_prototyping();

    let mut allocator = SlotAllocator::new(config, device.props());

    let layout = Arc::new(PipelineLayout::new(vec![
        LayoutEntry {
            set: 0,
            binding: 0,
            kind: SlotKind::Resource,
        },
        LayoutEntry {
            set: 0,
            binding: 1,
            kind: SlotKind::Resource,
        },
        LayoutEntry {
            set: 1,
            binding: 0,
            kind: SlotKind::Resource,
        },
        LayoutEntry {
            set: 0,
            binding: 2,
            kind: SlotKind::Sampler,
        },
    ]));

    let sampler = unsafe { allocator.create_view(&device, &ViewDesc::Sampler(0)) }?;

    // Render target with 4 mip levels, read by shaders after being rendered to.
    let mut target_state = ResourceStateTracker::new(4);

    let mut textures = VecDeque::new();
    let mut cache = BindingCache::new();
    let mut commands = MockCommandList::new();

    for frame in 0..FRAMES {
        // Stream textures in and out.
        if textures.len() >= 256 {
            while textures.len() > 128 {
                let mut view = textures.pop_front().unwrap();
                allocator.free_slot(SlotKind::Resource, &mut view);
            }
        }

        for _ in 0..16 {
            let view = unsafe {
                allocator.create_view(
                    &device,
                    &ViewDesc::Texture(TextureView {
                        texture: frame,
                        subresources: SubresourceRange::whole(1, 1),
                    }),
                )
            }?;
            textures.push_back(view);
        }

        let mut barriers = target_state.transition(Subresources::All, ResourceState::ColorTarget);
        barriers.extend(target_state.transition(Subresources::All, ResourceState::ShaderRead));
        tracing::trace!("Frame {} target barriers: {:?}", frame, barriers);

        cache.reset();
        commands.clear();
        cache.bind(&layout);
        cache.set_param(0, 2, BindingParam::Sampler(sampler))?;

        for draw in 0..DRAWS_PER_FRAME {
            let texture = textures[(draw as usize * 7) % textures.len()];
            cache.set_param(
                0,
                0,
                BindingParam::Texture {
                    view: texture,
                    subresources: SubresourceRange::whole(1, 1),
                },
            )?;

            cache.set_param(
                0,
                1,
                BindingParam::Dynamic(BufferView {
                    address: 0x1000 + (draw % 4) * 256,
                    size: 256,
                }),
            )?;

            unsafe { cache.prepare_for_draw(&device, &mut allocator, &mut commands) }?;
        }

        if frame % 100 == 0 {
            tracing::info!(
                "Frame {}: {} table bindings, {} transient resource slots, {} live pages",
                frame,
                commands.bindings().len(),
                allocator.transient(SlotKind::Resource).used_slots(),
                device.live_pages(),
            );
        }

        // Single frame in flight: device work of this frame is complete here.
        unsafe { allocator.reset_transient() }
    }

    println!(
        "{} pages created, {} views copied in {} batches",
        device.total_pages_created(),
        device.copied_views(),
        device.copy_calls()
    );

    unsafe { allocator.cleanup(&device) }

    Ok(())
}
