//! End-to-end host-side pipeline test: assemble draw commands for a small
//! crowd, run the reference cull that mirrors `culling.wgsl`, and check the
//! compacted arguments against the assembly-time snapshot.
//!
use glam::{Mat4, Vec3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use wgpu_crowd::renderer::culling::{visible_counts, CullSettings};
use wgpu_crowd::renderer::frustum::Frustum;
use wgpu_crowd::renderer::instance::{
    pack_anim_speed, pack_mesh_skin, unpack_anim_speed, unpack_mesh_skin,
};
use wgpu_crowd::renderer::{
    DrawCommandAssembler, IndirectDrawArgs, InstanceDataStore, InstanceRecord,
    MeshSegmentDescriptor, MeshSegmentRegistry,
};

fn three_prototype_registry() -> MeshSegmentRegistry {
    let segments = vec![
        MeshSegmentDescriptor {
            base_vertex: 0,
            start_index: 0,
            index_count: 36,
            prototype: 0,
        },
        MeshSegmentDescriptor {
            base_vertex: 24,
            start_index: 36,
            index_count: 60,
            prototype: 1,
        },
        MeshSegmentDescriptor {
            base_vertex: 60,
            start_index: 96,
            index_count: 24,
            prototype: 2,
        },
    ];
    MeshSegmentRegistry::new(segments, 120).unwrap()
}

/// Host mirror of the compact_args stage: copy the snapshot, overwrite only
/// the instance count.
fn compact(snapshot: &[IndirectDrawArgs], counts: &[u32]) -> Vec<IndirectDrawArgs> {
    snapshot
        .iter()
        .zip(counts.iter())
        .map(|(args, &count)| IndirectDrawArgs {
            instance_count: count,
            ..*args
        })
        .collect()
}

#[test]
fn assembly_then_cull_matches_the_reference_scenario() {
    let registry = three_prototype_registry();
    let stream = DrawCommandAssembler::assemble(&[10, 0, 5], &registry, 15).unwrap();

    let offsets: Vec<u32> = stream.args.iter().map(|a| a.first_instance).collect();
    assert_eq!(offsets, [0, 10, 10]);
    let counts: Vec<u32> = stream.args.iter().map(|a| a.instance_count).collect();
    assert_eq!(counts, [10, 0, 5]);

    // Populate the store: prototype 0 gets 10 instances of which 4 are
    // behind the camera, prototype 2 gets 5 of which 2 are.
    let mut store = InstanceDataStore::new(16);
    for i in 0..10u32 {
        let z = if i < 4 { 50.0 } else { -10.0 - i as f32 };
        store
            .write(
                i,
                InstanceRecord::new(
                    Mat4::from_translation(Vec3::new(i as f32 * 0.1, 0.0, z)),
                    0,
                    0,
                    0,
                    1.0,
                ),
            )
            .unwrap();
    }
    for i in 0..5u32 {
        let z = if i < 2 { 50.0 } else { -20.0 - i as f32 };
        store
            .write(
                10 + i,
                InstanceRecord::new(
                    Mat4::from_translation(Vec3::new(0.0, 0.0, z)),
                    2,
                    0,
                    0,
                    1.0,
                ),
            )
            .unwrap();
    }

    let frustum = Frustum::from_matrix(Mat4::perspective_rh(
        60f32.to_radians(),
        1.0,
        0.1,
        500.0,
    ));
    let settings = CullSettings {
        global_transform: Mat4::IDENTITY,
        sphere_radius: 0.5,
        max_distance: 0.0,
        camera_pos: Vec3::ZERO,
    };

    let visible = visible_counts(store.records(), 3, &settings, &frustum);
    assert_eq!(visible, [6, 0, 3]);

    let compacted = compact(&stream.args, &visible);
    for (before, after) in stream.args.iter().zip(compacted.iter()) {
        assert!(after.instance_count <= before.instance_count);
        assert_eq!(after.index_count, before.index_count);
        assert_eq!(after.first_index, before.first_index);
        assert_eq!(after.base_vertex, before.base_vertex);
        assert_eq!(after.first_instance, before.first_instance);
    }
    let final_counts: Vec<u32> = compacted.iter().map(|a| a.instance_count).collect();
    assert_eq!(final_counts, [6, 0, 3]);
}

#[test]
fn shrinking_capacity_below_the_live_stream_is_rejected_up_front() {
    let registry = three_prototype_registry();
    let stream = DrawCommandAssembler::assemble(&[10, 0, 5], &registry, 15).unwrap();

    // A capacity change re-runs assembly with the live counts under the new
    // capacity before any buffer is touched; a shrink below the stream's
    // total must fail that check and leave the stream as it was.
    let counts: Vec<u32> = stream.args.iter().map(|a| a.instance_count).collect();
    let result = DrawCommandAssembler::assemble(&counts, &registry, 10);
    assert!(matches!(
        result,
        Err(wgpu_crowd::CrowdError::CapacityExceeded { requested: 15, capacity: 10 })
    ));
    assert_eq!(stream.total_instances, 15);
    let offsets: Vec<u32> = stream.args.iter().map(|a| a.first_instance).collect();
    assert_eq!(offsets, [0, 10, 10]);

    // Growing re-assembles identically.
    let regrown = DrawCommandAssembler::assemble(&counts, &registry, 32).unwrap();
    assert_eq!(regrown.args, stream.args);
    assert_eq!(regrown.commands, stream.commands);
}

#[test]
fn packed_words_roundtrip_for_random_id_pairs() {
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    for _ in 0..10_000 {
        let mesh: u16 = rng.gen();
        let skin: u16 = rng.gen();
        assert_eq!(unpack_mesh_skin(pack_mesh_skin(mesh, skin)), (mesh, skin));

        let anim: u16 = rng.gen();
        let speed: f32 = rng.gen_range(0.0f32..4.0);
        let (decoded_anim, decoded_speed) = unpack_anim_speed(pack_anim_speed(anim, speed));
        assert_eq!(decoded_anim, anim);
        assert!(
            (decoded_speed - speed).abs() <= speed.abs().max(1.0) * 1e-2,
            "speed {} decoded as {}",
            speed,
            decoded_speed
        );
    }
}

#[test]
fn offsets_match_prefix_sums_for_random_distributions() {
    let mut rng = SmallRng::seed_from_u64(7);
    let registry = three_prototype_registry();
    for _ in 0..200 {
        let counts = [
            rng.gen_range(0u32..100),
            rng.gen_range(0u32..100),
            rng.gen_range(0u32..100),
        ];
        let total: u32 = counts.iter().sum();
        let stream = DrawCommandAssembler::assemble(&counts, &registry, 300).unwrap();

        let mut expected = 0;
        for (prototype, args) in stream.args.iter().enumerate() {
            assert_eq!(args.first_instance, expected);
            assert_eq!(stream.commands[prototype].first_instance, expected);
            expected += counts[prototype];
        }
        assert_eq!(stream.total_instances, total);
    }
}
