use approx::assert_relative_eq;
use kornia_colmap::{
    binary, testing::SyntheticScene, ColmapPoint3d, ImageDecodeOptions, RecordKind,
};
use kornia_colmap_engine::{ColmapEngine, EngineError, EngineInputs, EngineLoad};

fn load(scene: &SyntheticScene) -> Result<EngineLoad, EngineError> {
    ColmapEngine::load(EngineInputs {
        cameras: scene.cameras_binary().into(),
        images: scene.images_binary().into(),
        points3d: scene.points3d_binary().into(),
    })
}

#[test]
fn engine_matches_interpreted_decoders() -> Result<(), EngineError> {
    let scene = SyntheticScene::generate(15, 300, 42);
    let EngineLoad {
        engine,
        cameras,
        images,
    } = load(&scene)?;

    let expected_cameras = binary::decode_cameras_binary(&scene.cameras_binary())?;
    let expected_images =
        binary::decode_images_binary(&scene.images_binary(), ImageDecodeOptions::default())?;
    let expected_points = binary::decode_points3d_binary(&scene.points3d_binary())?;

    assert_eq!(cameras, expected_cameras);

    // metadata is identical, keypoints are only available on demand
    for (image_id, expected) in &expected_images {
        let image = &images[image_id];
        assert_eq!(image.name, expected.name);
        assert_eq!(image.qvec, expected.qvec);
        assert_eq!(image.num_points2d, expected.num_points2d);
        assert!(image.points2d.is_none());
        assert_eq!(engine.num_points2d(*image_id)?, Some(expected.num_points2d));
        assert_eq!(Some(engine.fetch_points2d(*image_id)?), expected.points2d);
    }

    let mut visited = Vec::new();
    engine.for_each_point3d(|p| visited.push(p.to_point3d()))?;
    let expected = expected_points.values().cloned().collect::<Vec<ColmapPoint3d>>();
    assert_eq!(visited, expected);

    for (rank, point) in expected_points.values().enumerate() {
        assert_eq!(engine.track_length(point.point3d_id)?, Some(point.track.len()));
        assert_eq!(engine.track_length_by_rank(rank)?, Some(point.track.len()));
        assert_eq!(
            engine.point3d_by_rank(rank)?.map(|p| p.point3d_id),
            Some(point.point3d_id)
        );
    }
    assert_eq!(engine.track_length(0)?, None);
    Ok(())
}

#[test]
fn rendering_columns_follow_file_order() -> Result<(), EngineError> {
    let scene = SyntheticScene::generate(4, 50, 9);
    let load = load(&scene)?;
    let positions = load.engine.point_positions()?;
    let colors = load.engine.point_colors()?;
    let errors = load.engine.point_errors()?;
    assert_eq!(positions.len(), scene.points3d.len());
    for (idx, point) in scene.points3d.iter().enumerate() {
        assert_relative_eq!(positions[idx][0], point.xyz[0]);
        assert_eq!(colors[idx], point.rgb);
        assert_eq!(errors[idx].to_bits(), point.error.to_bits());
    }
    assert_eq!(
        load.engine.point3d(scene.points3d[0].point3d_id)?.as_ref(),
        Some(&scene.points3d[0])
    );
    Ok(())
}

#[test]
fn malformed_points_fail_the_load() {
    let scene = SyntheticScene::generate(4, 10, 2);
    let mut points = scene.points3d_binary();
    points.truncate(points.len() - 3);
    let result = ColmapEngine::load(EngineInputs {
        cameras: scene.cameras_binary().into(),
        images: scene.images_binary().into(),
        points3d: points.into(),
    });
    match result {
        Err(EngineError::Colmap(kornia_colmap::ColmapError::MalformedRecord { kind, .. })) => {
            assert_eq!(kind, RecordKind::Point3d)
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("truncated buffer must not load"),
    }
}

#[test]
fn rig_data_is_decoded_from_binary() -> Result<(), EngineError> {
    use kornia_colmap::{testing, Frame, FrameDataId, Rig, RigidTransform, SensorId, SensorType};

    let scene = SyntheticScene::generate(2, 4, 2);
    let load = load(&scene)?;
    let sensor = SensorId {
        sensor_type: SensorType::Camera,
        id: 1,
    };
    let rigs = testing::encode_rigs_binary(&[Rig {
        rig_id: 1,
        ref_sensor: Some(sensor),
        sensors: vec![],
    }]);
    let frames = testing::encode_frames_binary(&[Frame {
        frame_id: 1,
        rig_id: 1,
        rig_from_world: RigidTransform::default(),
        data_ids: vec![FrameDataId {
            sensor_id: sensor,
            data_id: 1,
        }],
    }]);
    let rig_data = load
        .engine
        .decode_rig_data(&rigs.into(), &frames.into())?;
    assert_eq!(rig_data.rigs.len(), 1);
    assert_eq!(rig_data.frames[&1].data_ids.len(), 1);
    Ok(())
}
