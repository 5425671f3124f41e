//! 环回自检演示：在 mock 控制器上初始化传输层，测一次往返时间，
//! 再灌一批帧进流水线并打印诊断指标。
//!
//! ```bash
//! cargo run -p canlink-driver --example loopback_rtt
//! ```

use canlink_can::MockController;
use canlink_driver::{LinkBuilder, LinkFrame, MessageId};
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::INFO)
        .init();

    let link = LinkBuilder::new()
        .bitrate(1_000_000)
        .debug_level(2)
        .build(MockController::new())
        .expect("failed to initialize link");

    let round_trip = link
        .measure_round_trip_time(1000)
        .expect("self test failed");
    println!("round-trip time: {} us", round_trip);

    for command in 0..8u16 {
        let id = MessageId::new(3, 0x042, command);
        link.enqueue(LinkFrame::with_message_id(id, &command.to_le_bytes()), false)
            .expect("enqueue failed");
    }
    std::thread::sleep(Duration::from_millis(200));

    println!("latency: {:?}", link.latency_metrics());
    println!("queue: {:?}", link.queue_status());
    println!("bus load: {}%", link.bus_load());
    println!(
        "attempts: {}, retransmissions: {}, collision rate: {}%",
        link.transmission_attempts(),
        link.retransmission_count(),
        link.collision_rate()
    );
}
