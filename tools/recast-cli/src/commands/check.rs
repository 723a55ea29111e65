//! Check host capture capabilities.

use recast_backend_gst::{GstDisplaySource, GstEncoderFactory};
use recast_engine::policy::{bitrate_plan, capture_constraints, codec_candidates, PlatformClass};
use recast_engine::{DisplaySource, EncoderFactory};

pub fn run() -> anyhow::Result<()> {
    let class = PlatformClass::detect();
    println!("Recast System Check");
    println!("{}", "=".repeat(50));
    println!("Platform class: {class:?}");

    let display = GstDisplaySource::new();
    if display.is_available() {
        println!("[OK] Display capture available");
    } else {
        println!("[WARN] No display server detected");
    }
    if !display.is_secure_context() {
        println!("[WARN] Display is remote; capture will be refused");
    }

    let encoder = GstEncoderFactory::new();
    println!();
    println!("Codec candidates (in preference order):");
    for codec in codec_candidates(class) {
        let mark = if encoder.is_supported(codec) {
            "[OK]  "
        } else {
            "[SKIP]"
        };
        println!("  {mark} {}", codec.mime_type());
    }

    println!();
    println!("Bitrate plans:");
    for (width, height) in [(3840u32, 2160u32), (2560, 1440), (1920, 1080), (1280, 720)] {
        let plan = bitrate_plan(width, height, class);
        println!(
            "  {width}x{height}: video {} Mbps, audio {} kbps",
            plan.video_bps / 1_000_000,
            plan.audio_bps / 1_000
        );
    }

    let constraints = capture_constraints(class, true);
    println!();
    println!(
        "Capture request: up to {}x{} @ {} fps",
        constraints.width.max, constraints.height.max, constraints.frame_rate.max
    );

    Ok(())
}
