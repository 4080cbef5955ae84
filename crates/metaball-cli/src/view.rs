//! `metaball view`: subscribe to a publisher and print the newest pose and
//! force until Ctrl-C.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use metaball_middleware::TelemetrySubscriber;
use metaball_types::{MetaballError, TelemetryMessage};

pub fn execute(address: &str, timeout_ms: u64) -> Result<(), MetaballError> {
    let stop = Arc::new(AtomicBool::new(false));
    crate::install_ctrlc(Arc::clone(&stop));
    let runtime = crate::build_runtime()?;
    runtime.block_on(watch(address, timeout_ms, stop))
}

async fn watch(address: &str, timeout_ms: u64, stop: Arc<AtomicBool>) -> Result<(), MetaballError> {
    let mut subscriber = TelemetrySubscriber::connect(address, timeout_ms).await?;
    println!(
        "  Subscribed to {} (timeout {} ms)\n",
        subscriber.endpoint().to_string().bold(),
        subscriber.timeout_ms()
    );

    let mut received = 0u64;
    let mut timeouts = 0u64;
    while !stop.load(Ordering::SeqCst) {
        match subscriber.receive().await {
            Ok(msg) => {
                received += 1;
                println!("{}", format_message(&msg));
            }
            Err(MetaballError::Timeout(ms)) => {
                timeouts += 1;
                println!("  {}", format!("no telemetry within {ms} ms").yellow());
            }
            Err(e) => return Err(e),
        }
    }
    println!("\n  {} {} message(s), {} timeout(s)", "✓".green().bold(), received, timeouts);
    Ok(())
}

fn format_vec(values: &[f32]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:>9.3}")).collect();
    format!("[{}]", parts.join(","))
}

/// One line per message: pose, the first six force components, and sizes.
pub fn format_message(msg: &TelemetryMessage) -> String {
    let force = &msg.force[..msg.force.len().min(6)];
    format!(
        "  t={:.3} pose={} force={} node={} img={}B",
        msg.timestamp,
        format_vec(&msg.pose),
        format_vec(force),
        msg.node.len(),
        msg.image.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_pose_force_and_sizes() {
        let msg = TelemetryMessage {
            timestamp: 12.5,
            image: vec![0xFF, 0xD8, 0xFF, 0xD9],
            pose: vec![1.0, -2.0, 3.25, 0.0, 0.0, 0.5],
            force: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 9.0],
            node: vec![0.0; 1800],
        };
        let line = format_message(&msg);
        assert!(line.contains("t=12.500"));
        assert!(line.contains("    3.250"));
        assert!(line.contains("   -2.000"));
        assert!(!line.contains("9.000"), "only six force components are shown");
        assert!(line.contains("node=1800"));
        assert!(line.ends_with("img=4B"));
    }

    #[test]
    fn empty_vectors_render() {
        let msg = TelemetryMessage {
            timestamp: 0.0,
            image: Vec::new(),
            pose: Vec::new(),
            force: Vec::new(),
            node: Vec::new(),
        };
        assert_eq!(format_message(&msg), "  t=0.000 pose=[] force=[] node=0 img=0B");
    }

    #[test]
    fn bad_address_is_reported() {
        let err = execute("udp://127.0.0.1:1", 50).unwrap_err();
        assert!(matches!(err, MetaballError::Configuration(_)));
    }
}
