//! End-to-end pipeline tests over real backends: filesystem storage, the
//! in-memory LRU cache, and the raster engine.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, RgbImage};

use rimg::{
    fingerprint, FsBlobStore, ImageService, MemoryCache, RasterEngine, RequestSpec, ScaleMode,
    ServiceError,
};

fn test_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 7])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn make_service(root: &std::path::Path) -> ImageService {
    ImageService::new(
        Arc::new(FsBlobStore::new(root)),
        Arc::new(RasterEngine::new()),
    )
    .with_cache(Arc::new(MemoryCache::with_capacity(8 * 1024 * 1024)))
}

fn scaled_spec(fp: &str, width: u32) -> RequestSpec {
    RequestSpec {
        fingerprint: fp.to_string(),
        scale: true,
        scale_width: width,
        format: Some("jpeg".to_string()),
        quality: 80,
        ..RequestSpec::default()
    }
}

#[tokio::test]
async fn test_save_then_get_origin_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let service = make_service(dir.path());

    let payload = test_png(64, 48);
    let descriptor = service.save_image(&payload).await.unwrap();
    assert_eq!(descriptor.fingerprint, fingerprint(&payload));
    assert_eq!((descriptor.width, descriptor.height), (64, 48));
    assert_eq!(descriptor.format, "png");

    let spec = RequestSpec::origin(&descriptor.fingerprint);
    let data = service.get_image(&spec).await.unwrap();
    assert_eq!(&data[..], &payload[..]);
}

#[tokio::test]
async fn test_get_on_empty_tiers_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = make_service(dir.path());

    let spec = RequestSpec::origin(fingerprint(b"never uploaded"));
    assert!(matches!(
        service.get_image(&spec).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_scaled_rendition_decodes_at_target_size() {
    let dir = tempfile::tempdir().unwrap();
    let service = make_service(dir.path());

    let descriptor = service.save_image(&test_png(64, 48)).await.unwrap();
    let data = service
        .get_image(&scaled_spec(&descriptor.fingerprint, 32))
        .await
        .unwrap();

    let img = image::load_from_memory(&data).unwrap();
    assert_eq!((img.width(), img.height()), (32, 24));
    // The adapter asked for jpeg
    assert_eq!(&data[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn test_fit_and_fill_modes() {
    let dir = tempfile::tempdir().unwrap();
    let service = make_service(dir.path());
    let descriptor = service.save_image(&test_png(100, 50)).await.unwrap();

    let mut fit = scaled_spec(&descriptor.fingerprint, 40);
    fit.scale_height = 40;
    fit.scale_mode = Some(ScaleMode::Fit);
    let img = image::load_from_memory(&service.get_image(&fit).await.unwrap()).unwrap();
    assert_eq!((img.width(), img.height()), (40, 20));

    let mut fill = scaled_spec(&descriptor.fingerprint, 40);
    fill.scale_height = 40;
    fill.scale_mode = Some(ScaleMode::Fill);
    let img = image::load_from_memory(&service.get_image(&fill).await.unwrap()).unwrap();
    assert_eq!((img.width(), img.height()), (80, 40));
}

#[tokio::test]
async fn test_persisted_derivative_visible_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let service_a = make_service(dir.path());

    let descriptor = service_a.save_image(&test_png(64, 48)).await.unwrap();
    let mut spec = scaled_spec(&descriptor.fingerprint, 16);
    spec.save = true;
    let derived = service_a.get_image(&spec).await.unwrap();

    // A second instance sharing the storage root but nothing else serves the
    // persisted derivative byte-identically.
    let service_b = make_service(dir.path());
    let again = service_b.get_image(&spec).await.unwrap();
    assert_eq!(derived, again);
}

#[tokio::test]
async fn test_unsaved_derivative_not_visible_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let service_a = make_service(dir.path());

    let descriptor = service_a.save_image(&test_png(64, 48)).await.unwrap();
    let mut spec = scaled_spec(&descriptor.fingerprint, 16);
    spec.save = false;
    let derived = service_a.get_image(&spec).await.unwrap();

    // The second instance has to re-transform; results are still identical
    // because the transform is a pure function of origin + parameters.
    let service_b = make_service(dir.path());
    let info = service_b.info_image(&spec).await;
    assert!(matches!(info, Err(ServiceError::NotFound(_))));

    let again = service_b.get_image(&spec).await.unwrap();
    let a = image::load_from_memory(&derived).unwrap();
    let b = image::load_from_memory(&again).unwrap();
    assert_eq!(a.to_rgb8().as_raw(), b.to_rgb8().as_raw());
}

#[tokio::test]
async fn test_info_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let service = make_service(dir.path());

    let payload = test_png(80, 60);
    let saved = service.save_image(&payload).await.unwrap();

    let described = service
        .info_image(&RequestSpec::origin(&saved.fingerprint))
        .await
        .unwrap();
    assert_eq!(described.fingerprint, saved.fingerprint);
    assert_eq!((described.width, described.height), (80, 60));
    assert_eq!(described.size, payload.len());
}

#[tokio::test]
async fn test_delete_removes_origin_and_persisted_derivatives() {
    let dir = tempfile::tempdir().unwrap();
    let service = make_service(dir.path());

    let descriptor = service.save_image(&test_png(64, 48)).await.unwrap();
    let mut spec = scaled_spec(&descriptor.fingerprint, 16);
    spec.save = true;
    service.get_image(&spec).await.unwrap();

    service.delete_image(&descriptor.fingerprint).await.unwrap();

    // Cold instance: nothing left in storage for either rendition
    let cold = make_service(dir.path());
    assert!(matches!(
        cold.get_image(&RequestSpec::origin(&descriptor.fingerprint))
            .await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        cold.get_image(&spec).await,
        Err(ServiceError::NotFound(_))
    ));
}
