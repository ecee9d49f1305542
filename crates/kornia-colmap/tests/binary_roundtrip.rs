use std::collections::BTreeMap;

use kornia_colmap::{
    binary, decode_cameras, decode_images, decode_points3d, testing::SyntheticScene,
    CameraModelId, ColmapError, ColmapSource, ImageDecodeOptions,
};

#[test]
fn synthetic_scene_roundtrips_every_camera_model() -> Result<(), ColmapError> {
    let scene = SyntheticScene::generate(24, 500, 7);

    let cameras = binary::decode_cameras_binary(&scene.cameras_binary())?;
    let images = binary::decode_images_binary(&scene.images_binary(), ImageDecodeOptions::default())?;
    let points3d = binary::decode_points3d_binary(&scene.points3d_binary())?;

    let models = cameras.values().map(|c| c.model_id).collect::<Vec<_>>();
    assert_eq!(models, CameraModelId::ALL.to_vec());

    let expected_cameras = scene
        .cameras
        .iter()
        .map(|c| (c.camera_id, c.clone()))
        .collect::<BTreeMap<_, _>>();
    let expected_images = scene
        .images
        .iter()
        .map(|i| (i.image_id, i.clone()))
        .collect::<BTreeMap<_, _>>();
    let expected_points = scene
        .points3d
        .iter()
        .map(|p| (p.point3d_id, p.clone()))
        .collect::<BTreeMap<_, _>>();

    assert_eq!(cameras, expected_cameras);
    assert_eq!(images, expected_images);
    assert_eq!(points3d, expected_points);
    Ok(())
}

#[test]
fn sources_dispatch_on_encoding() -> Result<(), ColmapError> {
    let scene = SyntheticScene::generate(3, 10, 1);

    let cameras = decode_cameras(&ColmapSource::binary(scene.cameras_binary()))?;
    assert_eq!(cameras.len(), CameraModelId::ALL.len());

    let images = decode_images(
        &ColmapSource::binary(scene.images_binary()),
        ImageDecodeOptions {
            keep_points2d: false,
        },
    )?;
    assert!(images.values().all(|image| image.points2d.is_none()));
    assert!(images.values().all(|image| image.num_points2d > 0));

    let points = decode_points3d(&ColmapSource::text(
        "# POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[]\n1 0 0 0 1 2 3 0.5 1 0\n",
    ))?;
    assert_eq!(points[&1].rgb, [1, 2, 3]);
    Ok(())
}

#[test]
fn unmatched_keypoints_survive_decoding() -> Result<(), ColmapError> {
    let scene = SyntheticScene::generate(2, 4, 3);
    let images = binary::decode_images_binary(&scene.images_binary(), ImageDecodeOptions::default())?;
    for image in images.values() {
        let points2d = image.points2d.as_ref().expect("keypoints retained");
        assert_eq!(points2d.len(), image.num_points2d);
        assert_eq!(points2d.last().and_then(|p| p.point3d_id), None);
    }
    Ok(())
}
