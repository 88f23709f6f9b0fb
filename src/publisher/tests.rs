use super::*;
use crate::calibration::CalibrationRecord;
use crate::device::{synthetic_frame, LensParameters};
use crate::registry::{Channel, StreamDescriptor, UseCaseEntry};
use std::sync::Arc;

fn create_test_entry() -> UseCaseEntry {
    UseCaseEntry {
        name: "MIXED".to_string(),
        min_access_level: 1,
        streams: vec![
            StreamDescriptor {
                stream_id: 10,
                channels: Channel::ALL.to_vec(),
            },
            StreamDescriptor {
                stream_id: 20,
                channels: vec![Channel::Gray, Channel::CameraInfo],
            },
        ],
    }
}

fn create_test_calibration(stream_id: u16) -> Arc<CalibrationRecord> {
    let lens = LensParameters {
        principal_point: (2.0, 1.5),
        focal_length: (100.0, 100.0),
        distortion_tangential: (0.0, 0.0),
        distortion_radial: vec![0.0, 0.0, 0.0],
        width: 4,
        height: 3,
    };
    Arc::new(CalibrationRecord::from_lens(stream_id, "camera_optical_link", &lens))
}

#[test]
fn test_publisher_set_topics() {
    let transport = RecordingTransport::new();
    let set = PublisherSet::build(&transport, &create_test_entry(), 1);

    assert_eq!(set.endpoint_count(), 9);
    assert_eq!(set.generation(), 1);
    assert!(set.is_materialized(10, Channel::Cloud));
    assert!(set.is_materialized(20, Channel::Gray));
    assert!(!set.is_materialized(20, Channel::Cloud));

    let topics = set.topics();
    assert!(topics.contains(&"stream/1/cloud".to_string()));
    assert!(topics.contains(&"stream/1/conf".to_string()));
    assert!(topics.contains(&"stream/1/exposure_times".to_string()));
    assert!(topics.contains(&"stream/2/camera_info".to_string()));
    assert!(!topics.contains(&"stream/2/cloud".to_string()));
}

#[test]
fn test_emit_routes_and_counts() {
    let transport = RecordingTransport::new();
    let set = PublisherSet::build(&transport, &create_test_entry(), 1);
    let frame = synthetic_frame(20, 4, 3, 0, 400);
    let calibration = create_test_calibration(20);
    let ctx = FrameContext {
        frame: &frame,
        seq: 0,
        optical_frame: "camera_optical_link",
        sensor_frame: "camera_link",
        calibration: &calibration,
    };

    assert!(set.emit(20, Channel::Gray, Arc::new(ctx.build(Channel::Gray))));
    assert!(!set.emit(20, Channel::Cloud, Arc::new(ctx.build(Channel::Cloud))));
    assert!(!set.emit(99, Channel::Gray, Arc::new(ctx.build(Channel::Gray))));

    assert_eq!(set.emitted(), 1);
    let published = transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "stream/2/gray");
}

#[test]
fn test_frame_context_builds_every_channel() {
    let frame = synthetic_frame(10, 4, 3, 0, 400);
    let calibration = create_test_calibration(10);
    let ctx = FrameContext {
        frame: &frame,
        seq: 7,
        optical_frame: "camera_optical_link",
        sensor_frame: "camera_link",
        calibration: &calibration,
    };

    match ctx.build(Channel::Cloud) {
        DataMessage::Cloud(cloud) => {
            assert_eq!(cloud.header.frame_id, "camera_link");
            assert_eq!(cloud.header.seq, 7);
            assert_eq!(cloud.points.len(), 12);
            assert!(!cloud.is_dense);
            // Top row of the synthetic frame is invalid
            assert!(cloud.points[0].z.is_nan());
            assert!(!cloud.points[4].z.is_nan());
            assert!(Arc::ptr_eq(&cloud.calibration, &calibration));
        }
        other => panic!("Expected cloud, got {:?}", other),
    }

    match ctx.build(Channel::Xyz) {
        DataMessage::Image(image) => {
            assert_eq!(image.encoding, ImageEncoding::Float32C3);
            assert_eq!(image.data.len(), 36);
            assert_eq!(image.header.frame_id, "camera_link");
        }
        other => panic!("Expected xyz image, got {:?}", other),
    }

    for (channel, encoding) in [
        (Channel::Gray, ImageEncoding::Mono16),
        (Channel::Confidence, ImageEncoding::Mono8),
        (Channel::Noise, ImageEncoding::Float32C1),
    ] {
        match ctx.build(channel) {
            DataMessage::Image(image) => {
                assert_eq!(image.encoding, encoding);
                assert_eq!(image.data.len(), 12);
                assert_eq!(image.header.frame_id, "camera_optical_link");
                assert_eq!((image.width, image.height), (4, 3));
            }
            other => panic!("Expected image for {}, got {:?}", channel, other),
        }
    }

    match ctx.build(Channel::Exposure) {
        DataMessage::Exposure(exposure) => {
            assert_eq!(exposure.stream_id, 10);
            assert_eq!(exposure.usecs, vec![100, 400]);
        }
        other => panic!("Expected exposure, got {:?}", other),
    }

    let info = ctx.build(Channel::CameraInfo);
    assert!(matches!(info, DataMessage::CameraInfo(_)));
    assert_eq!(info.calibration().unwrap().stream_id, 10);
}

#[test]
fn test_spatial_messages_carry_calibration() {
    let frame = synthetic_frame(10, 2, 2, 0, 400);
    let calibration = create_test_calibration(10);
    let ctx = FrameContext {
        frame: &frame,
        seq: 0,
        optical_frame: "o",
        sensor_frame: "s",
        calibration: &calibration,
    };

    for channel in Channel::ALL {
        let message = ctx.build(channel);
        assert_eq!(message.calibration().is_some(), channel != Channel::Exposure);
        if channel.is_spatial() {
            assert!(Arc::ptr_eq(message.calibration().unwrap(), &calibration));
        }
    }
}

#[tokio::test]
async fn test_broadcast_transport_delivers_to_subscribers() {
    let transport = BroadcastTransport::new(4);
    let mut receiver = transport.subscribe("stream/1/gray");
    let set = PublisherSet::build(&transport, &create_test_entry(), 1);

    let frame = synthetic_frame(10, 2, 2, 0, 400);
    let calibration = create_test_calibration(10);
    let ctx = FrameContext {
        frame: &frame,
        seq: 3,
        optical_frame: "o",
        sensor_frame: "s",
        calibration: &calibration,
    };
    assert!(set.emit(10, Channel::Gray, Arc::new(ctx.build(Channel::Gray))));

    let message = receiver.recv().await.unwrap();
    assert_eq!(message.header().seq, 3);
    assert!(transport.topics().contains(&"stream/2/camera_info".to_string()));
}
