use kornia_colmap::{
    testing, CameraModelId, ColmapCamera, ColmapImage, ColmapPoint3d, ColmapSource, Frame,
    FrameDataId, Point2d, Rig, RigSensor, RigidTransform, SensorId, SensorType, TrackElement,
};
use kornia_scene::{
    resolve_model_directory, EngineMode, LoadWarning, ReconstructionBuilder, ReconstructionConfig,
    ReconstructionSession, SceneError, SceneFiles,
};

fn camera() -> ColmapCamera {
    ColmapCamera {
        camera_id: 1,
        model_id: CameraModelId::Pinhole,
        width: 640,
        height: 480,
        params: vec![500.0, 500.0, 320.0, 240.0],
    }
}

fn image(points2d: Vec<Point2d>) -> ColmapImage {
    ColmapImage {
        image_id: 1,
        camera_id: 1,
        name: "frame_0001.png".to_string(),
        qvec: [1.0, 0.0, 0.0, 0.0],
        tvec: [0.0, 0.0, 0.0],
        num_points2d: points2d.len(),
        points2d: Some(points2d),
    }
}

fn point(point3d_id: u64, point2d_idx: u32) -> ColmapPoint3d {
    ColmapPoint3d {
        point3d_id,
        xyz: [point3d_id as f64, 0.0, 5.0],
        rgb: [128, 128, 128],
        error: 0.5,
        track: vec![TrackElement {
            image_id: 1,
            point2d_idx,
        }],
    }
}

fn files(images: &[ColmapImage], points: &[ColmapPoint3d]) -> SceneFiles {
    SceneFiles::new(
        ColmapSource::binary(testing::encode_cameras_binary(&[camera()])),
        ColmapSource::binary(testing::encode_images_binary(images)),
        ColmapSource::binary(testing::encode_points3d_binary(points)),
    )
}

fn configs() -> [ReconstructionConfig; 2] {
    [
        ReconstructionConfig::default(),
        ReconstructionConfig {
            engine: EngineMode::Disabled,
            parallel_decode: false,
            ..Default::default()
        },
    ]
}

fn camera_sensor(id: u32) -> SensorId {
    SensorId {
        sensor_type: SensorType::Camera,
        id,
    }
}

fn rig_files(frame_rig_id: u32) -> (ColmapSource, ColmapSource) {
    let rig = Rig {
        rig_id: 1,
        ref_sensor: Some(camera_sensor(1)),
        sensors: vec![RigSensor {
            sensor_id: camera_sensor(2),
            sensor_from_rig: Some(RigidTransform {
                rotation: [1.0, 0.0, 0.0, 0.0],
                translation: [0.1, 0.0, 0.0],
            }),
        }],
    };
    let frame = Frame {
        frame_id: 1,
        rig_id: frame_rig_id,
        rig_from_world: RigidTransform::default(),
        data_ids: vec![FrameDataId {
            sensor_id: camera_sensor(1),
            data_id: 1,
        }],
    };
    (
        ColmapSource::binary(testing::encode_rigs_binary(&[rig])),
        ColmapSource::binary(testing::encode_frames_binary(&[frame])),
    )
}

#[test]
fn minimal_scene() -> Result<(), SceneError> {
    let image = image(vec![
        Point2d::from_raw(10.0, 20.0, 1),
        Point2d::from_raw(12.0, 21.0, 1),
        Point2d::from_raw(30.0, 40.0, 2),
        Point2d::from_raw(31.0, 42.0, 2),
    ]);
    let self_track = |point3d_id: u64, first: u32| ColmapPoint3d {
        track: vec![
            TrackElement {
                image_id: 1,
                point2d_idx: first,
            },
            TrackElement {
                image_id: 1,
                point2d_idx: first + 1,
            },
        ],
        ..point(point3d_id, first)
    };
    let files = files(&[image], &[self_track(1, 0), self_track(2, 2)]);

    for config in configs() {
        let reconstruction = ReconstructionBuilder::new(config).build(&files)?.reconstruction;
        let stats = reconstruction.stats();
        assert_eq!(stats.global.total_points, 2);
        assert_eq!(stats.global.total_observations, 4);
        assert_eq!(stats.global.track_length.map(|t| t.mean), Some(2.0));
        assert_eq!(stats.image_stats[&1].num_points3d, 2);
        assert_eq!(stats.image_stats[&1].covisible_images, 0);
        assert!(stats.connected_images(1).is_some_and(|set| set.is_empty()));
        assert_eq!(stats.images_observing(2), Some(&[1][..]));
        assert_eq!(stats.points_observed_by(1), Some(&[1, 2][..]));
    }
    Ok(())
}

#[test]
fn unmatched_point2d_is_not_a_3d_observation() -> Result<(), SceneError> {
    let image = image(vec![Point2d::from_raw(1.0, 2.0, Point2d::UNMATCHED)]);
    let files = files(&[image], &[]);

    for config in configs() {
        let reconstruction = ReconstructionBuilder::new(config).build(&files)?.reconstruction;
        let stats = &reconstruction.stats().image_stats[&1];
        assert_eq!(stats.num_points2d, 1);
        assert_eq!(stats.num_points3d, 0);
        let points2d = reconstruction.points2d(1)?.expect("keypoints");
        assert_eq!(points2d[0].point3d_id, None);
    }
    Ok(())
}

#[test]
fn resolved_directory_builds() -> Result<(), SceneError> {
    let image = image(vec![Point2d::from_raw(10.0, 20.0, 1)]);
    let scene = files(&[image], &[point(1, 0)]);
    let (Some(cameras), Some(images), Some(points3d)) =
        (scene.cameras, scene.images, scene.points3d)
    else {
        panic!("incomplete scene");
    };

    let listing = vec![
        ("c/other/cameras.bin", ColmapSource::text("")),
        ("c/other/images.bin", ColmapSource::text("")),
        ("c/other/points3D.bin", ColmapSource::text("")),
        ("b/sparse/cameras.txt", ColmapSource::text("")),
        ("b/sparse/images.txt", ColmapSource::text("")),
        ("b/sparse/points3D.txt", ColmapSource::text("")),
        ("a/sparse/0/cameras.bin", cameras),
        ("a/sparse/0/images.bin", images),
        ("a/sparse/0/points3D.bin", points3d),
    ];
    let model = resolve_model_directory(listing).expect("a model directory");
    assert_eq!(model.directory, "a/sparse/0");

    let files = SceneFiles::load_resolved(&model, |resolved| {
        Ok::<_, SceneError>(resolved.file.clone())
    })?;
    let outcome = ReconstructionBuilder::default().build(&files)?;
    assert!(outcome.reconstruction.is_accelerated());
    assert_eq!(outcome.reconstruction.num_points3d(), 1);
    Ok(())
}

#[test]
fn valid_rig_data_is_attached() -> Result<(), SceneError> {
    let image = image(vec![Point2d::from_raw(10.0, 20.0, 1)]);
    let (rigs, frames) = rig_files(1);
    let files = files(&[image], &[point(1, 0)]).with_rig_data(rigs, frames);

    for config in configs() {
        let outcome = ReconstructionBuilder::new(config).build(&files)?;
        assert!(outcome.warnings.is_empty());
        let rig_data = outcome.reconstruction.rig_data().expect("rig data");
        assert_eq!(rig_data.rigs[&1].num_sensors(), 2);
        assert_eq!(rig_data.frames[&1].data_ids.len(), 1);
    }
    Ok(())
}

#[test]
fn invalid_rig_data_is_dropped_with_a_warning() -> Result<(), SceneError> {
    let image = image(vec![Point2d::from_raw(10.0, 20.0, 1)]);
    let (rigs, frames) = rig_files(5);
    let files = files(&[image], &[point(1, 0)]).with_rig_data(rigs, frames);

    for config in configs() {
        let outcome = ReconstructionBuilder::new(config).build(&files)?;
        assert!(outcome.reconstruction.rig_data().is_none());
        assert_eq!(
            outcome.warnings,
            vec![LoadWarning::PartialRigData(
                "frame 1 references unknown rig 5".to_string()
            )]
        );
    }

    let mut truncated = files.clone();
    truncated.frames = Some(ColmapSource::binary(vec![1u8, 0, 0]));
    let outcome = ReconstructionBuilder::default().build(&truncated)?;
    assert!(outcome.reconstruction.rig_data().is_none());
    assert!(matches!(
        outcome.warnings.as_slice(),
        [LoadWarning::PartialRigData(_)]
    ));
    Ok(())
}

#[test]
fn session_keeps_previous_reconstruction_on_failure() -> Result<(), SceneError> {
    let scene = testing::SyntheticScene::generate(5, 25, 4);
    let good = SceneFiles::new(
        ColmapSource::binary(scene.cameras_binary()),
        ColmapSource::binary(scene.images_binary()),
        ColmapSource::binary(scene.points3d_binary()),
    );

    let mut session = ReconstructionSession::default();
    assert!(session.current().is_none());
    session.load(&good)?;
    assert!(session.current().is_some_and(|r| r.is_accelerated()));

    let mut broken = good.clone();
    broken.images = None;
    assert!(matches!(
        session.load(&broken),
        Err(SceneError::MissingRequiredFiles(_))
    ));
    let current = session.current().expect("previous reconstruction");
    assert_eq!(current.num_points3d(), 25);
    assert!(current.fetch_points2d(1)?.is_some());

    session.load(&good)?;
    assert_eq!(session.current().map(|r| r.num_points3d()), Some(25));

    session.dispose();
    session.dispose();
    assert!(session.current().is_none());
    Ok(())
}
