use super::*;
use crate::error::DeviceError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn create_test_camera() -> SimulatedCamera {
    SimulatedCamera::new(SimulatedCameraSpec {
        width: 8,
        height: 6,
        access_codes: vec![("secret".to_string(), 2)],
        ..SimulatedCameraSpec::default()
    })
}

#[test]
fn test_provider_open_by_serial_and_wildcard() {
    let camera = create_test_camera();
    let serial = camera.spec().serial.clone();
    let provider = SimulatedProvider::with_camera(camera.clone());

    assert!(provider.open(&serial, "").is_ok());
    assert!(provider.open("-", "").is_ok());
    assert!(provider.open("", "").is_ok());

    match provider.open("no-such-serial", "") {
        Err(DeviceError::NotFound { serial }) => assert_eq!(serial, "no-such-serial"),
        other => panic!("Expected NotFound, got {:?}", other.map(|_| ())),
    }
    assert_eq!(camera.counters().opens.load(Ordering::Relaxed), 3);
}

#[test]
fn test_provider_scripted_failures_and_unplug() {
    let camera = create_test_camera();
    let provider = SimulatedProvider::with_camera(camera.clone());

    camera.fail_next_opens(1);
    assert!(matches!(provider.open("-", ""), Err(DeviceError::Sdk { .. })));
    assert!(provider.open("-", "").is_ok());

    camera.set_connected(false);
    assert!(matches!(
        provider.open("-", ""),
        Err(DeviceError::NotFound { .. })
    ));
}

#[test]
fn test_access_code_grants_level() {
    let camera = create_test_camera();
    let provider = SimulatedProvider::with_camera(camera);

    let mut basic = provider.open("-", "").unwrap();
    assert_eq!(basic.access_level(), 1);
    assert!(basic.set_use_case("MODE_RAW_GRAY").is_err());

    let mut privileged = provider.open("-", "secret").unwrap();
    assert_eq!(privileged.access_level(), 2);
    assert!(privileged.set_use_case("MODE_RAW_GRAY").is_ok());
}

#[test]
fn test_deliver_requires_listener_and_capture() {
    let camera = create_test_camera();
    let mut device: Box<dyn DepthCamera> = Box::new(camera.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    let frame = camera.synthetic_frame(0xdefa);
    assert!(!camera.deliver(&frame));

    let counter = Arc::clone(&calls);
    device
        .register_data_listener(Arc::new(move |_frame: &DepthFrame| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    assert!(!camera.deliver(&frame));

    device.start_capture().unwrap();
    assert!(camera.deliver(&frame));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    device.stop_capture().unwrap();
    assert!(!camera.deliver(&frame));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_exposure_range_is_enforced() {
    let camera = create_test_camera();
    let mut device: Box<dyn DepthCamera> = Box::new(camera.clone());

    assert!(device.set_exposure_time(0xdefa, 500).is_ok());
    assert_eq!(camera.exposure_time(0xdefa), Some(500));

    assert!(matches!(
        device.set_exposure_time(0xdefa, 5000),
        Err(DeviceError::ExposureOutOfRange { .. })
    ));
    assert!(matches!(
        device.set_exposure_time(0x1234, 500),
        Err(DeviceError::InvalidStream { stream_id: 0x1234 })
    ));
    assert_eq!(camera.exposure_time(0xdefa), Some(500));
}

#[test]
fn test_generator_delivers_frames() {
    let camera = SimulatedCamera::new(SimulatedCameraSpec {
        width: 4,
        height: 4,
        fps: Some(100),
        ..SimulatedCameraSpec::default()
    });
    let mut device: Box<dyn DepthCamera> = Box::new(camera.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    device
        .register_data_listener(Arc::new(move |_frame: &DepthFrame| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    device.start_capture().unwrap();
    std::thread::sleep(Duration::from_millis(200));
    device.stop_capture().unwrap();

    let delivered = calls.load(Ordering::SeqCst);
    assert!(delivered > 0);

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), delivered);
}

#[test]
fn test_synthetic_frame_geometry() {
    let frame = synthetic_frame(7, 5, 3, 0, 400);
    assert!(frame.validate_size());
    assert_eq!(frame.stream_id, 7);
    assert_eq!(frame.exposure_times, vec![100, 400]);
    assert!(frame.points[..5].iter().all(|p| !p.is_valid()));
    assert!(frame.points[5..].iter().all(|p| p.is_valid()));
}
