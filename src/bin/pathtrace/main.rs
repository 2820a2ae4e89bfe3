//! PathTrace CLI - Render the analytic test scene on the CPU device.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use pathtrace::device::{CpuDevice, Device};
use pathtrace::integrator::PathTrace;
use pathtrace::render::{RenderBuffers, Scene};
use pathtrace::settings::RenderSettings;
use pathtrace::util::init_logging;
use tracing::{debug, info, warn};

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut log_directive = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => log_directive = "debug",
            "-vv" | "--trace" => log_directive = "trace",
            "-q" | "--quiet" => log_directive = "error",
            _ => filtered_args.push(arg),
        }
    }
    init_logging(log_directive);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    match filtered_args[0] {
        // Render command - render and write EXR
        "render" | "r" => cmd_render(&filtered_args[1..]),

        // Settings command - show resolved settings
        "settings" | "s" => {
            if filtered_args.len() < 2 {
                eprintln!("Error: missing file argument");
                eprintln!("Usage: pathtrace-cli settings <file.json>");
                std::process::exit(1);
            }
            cmd_settings(filtered_args[1]);
        }

        "version" | "--version" | "-V" => print_version(),

        "help" | "h" | "--help" | "-h" => print_help(),

        cmd => {
            eprintln!("Unknown command: {}", cmd);
            eprintln!("Run 'pathtrace-cli help' for usage");
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!("pathtrace-cli - progressive path tracing driver");
    println!();
    println!("USAGE:");
    println!("    pathtrace-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    r, render   [options] <out.exr>   Render the scene and write the combined pass");
    println!("    s, settings <file.json>           Show resolved render settings");
    println!("    version                           Show version and build date");
    println!("    h, help                           Show this help");
    println!();
    println!("RENDER OPTIONS:");
    println!("    -c, --config <file>     Load settings from JSON");
    println!("    -s, --samples <n>       Samples per pixel");
    println!("    -W, --width <px>        Frame width");
    println!("    -H, --height <px>       Frame height");
    println!("    -t, --threads <n>       Worker threads (default: all cores)");
    println!("    --time-limit <secs>     Stop after the batch that crosses the limit");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only show errors");
    println!();
    println!("EXAMPLES:");
    println!("    pathtrace-cli render out.exr                  # Default scene, 16 spp");
    println!("    pathtrace-cli render -s 256 -t 8 out.exr      # 256 spp on 8 threads");
    println!("    pathtrace-cli render -c job.json out.exr      # Settings from file");
    println!("    pathtrace-cli -v render --time-limit 5 a.exr  # Verbose, 5 seconds max");
    println!();
    println!("Set RUST_LOG to override the log filter.");
}

fn print_version() {
    println!(
        "pathtrace-cli {} (built {} {})",
        env!("CARGO_PKG_VERSION"),
        env!("PATHTRACE_BUILD_DATE"),
        env!("PATHTRACE_BUILD_TIME")
    );
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&&str>) -> T {
    let Some(value) = value else {
        fail(format!("missing value for {}", flag));
    };
    value
        .parse()
        .unwrap_or_else(|_| fail(format!("invalid value for {}: {}", flag, value)))
}

fn cmd_settings(path: &str) {
    let settings = RenderSettings::load(path).unwrap_or_else(|e| fail(format!("{}: {}", path, e)));
    match serde_json::to_string_pretty(&settings) {
        Ok(json) => println!("{}", json),
        Err(e) => fail(e),
    }
}

fn cmd_render(args: &[&str]) {
    let mut settings = RenderSettings::default();
    let mut output: Option<&str> = None;

    // Config first so command line flags override it.
    if let Some(pos) = args.iter().position(|&a| a == "-c" || a == "--config") {
        let path: String = parse_value("--config", args.get(pos + 1));
        settings = RenderSettings::load(&path).unwrap_or_else(|e| fail(format!("{}: {}", path, e)));
        debug!("loaded settings from {}", path);
    }

    let mut i = 0;
    while i < args.len() {
        let flag = args[i];
        match flag {
            "-c" | "--config" => i += 1,
            "-s" | "--samples" => {
                settings.samples = parse_value(flag, args.get(i + 1));
                i += 1;
            }
            "-W" | "--width" => {
                settings.width = parse_value(flag, args.get(i + 1));
                i += 1;
            }
            "-H" | "--height" => {
                settings.height = parse_value(flag, args.get(i + 1));
                i += 1;
            }
            "-t" | "--threads" => {
                settings.threads = Some(parse_value(flag, args.get(i + 1)));
                i += 1;
            }
            "--time-limit" => {
                settings.time_limit_secs = Some(parse_value(flag, args.get(i + 1)));
                i += 1;
            }
            _ if flag.starts_with('-') => fail(format!("unknown option {}", flag)),
            _ => output = Some(flag),
        }
        i += 1;
    }

    let Some(output) = output else {
        eprintln!("Error: missing output file");
        eprintln!("Usage: pathtrace-cli render [options] <out.exr>");
        std::process::exit(1);
    };
    if let Err(e) = settings.validate() {
        fail(e);
    }

    let start = Instant::now();
    let rendered = match render(&settings, Path::new(output)) {
        Ok(rendered) => rendered,
        Err(e) => fail(e),
    };

    println!(
        "Rendered {} of {} samples at {}x{} in {:.2}s -> {}",
        rendered,
        settings.samples,
        settings.width,
        settings.height,
        start.elapsed().as_secs_f64(),
        output
    );
}

/// Run the full render and write the result. Returns the rendered sample count.
fn render(settings: &RenderSettings, output: &Path) -> pathtrace::Result<u32> {
    let scene = Arc::new(Scene::new(settings.scene.clone()));
    let device: Arc<dyn Device> = match settings.threads {
        Some(threads) => Arc::new(CpuDevice::new(scene, threads)),
        None => Arc::new(CpuDevice::with_default_threads(scene)),
    };

    let mut path_trace = PathTrace::new(device, settings.to_config())?;
    path_trace.reset(settings.buffer_params())?;
    path_trace.set_start_sample(settings.start_sample);

    let total = settings.samples;
    let render_start = Instant::now();
    path_trace.set_update_callback(move |_, samples| {
        info!(
            "{}/{} samples ({:.1}s)",
            samples,
            total,
            render_start.elapsed().as_secs_f64()
        );
    });

    if let Some(limit) = settings.time_limit() {
        path_trace.set_cancel_callback(move || render_start.elapsed() >= limit);
    }

    let written = WriteSlot::default();
    path_trace.set_write_callback(exr_write_callback(output.to_path_buf(), Arc::clone(&written)));

    path_trace.render_samples(total)?;

    let result = written.lock().take();
    match result {
        Some(result) => result,
        None => {
            warn!("render finished without writing {}", output.display());
            Ok(path_trace.rendered_samples_num())
        }
    }
}

/// Outcome of the write callback: the sample count written, or why not.
type WriteSlot = Arc<Mutex<Option<pathtrace::Result<u32>>>>;

fn exr_write_callback(path: PathBuf, slot: WriteSlot) -> impl FnMut(&RenderBuffers, u32) + Send + 'static {
    move |buffers: &RenderBuffers, samples: u32| {
        let result = write_exr(buffers, &path).map(|()| samples);
        if let Err(e) = &result {
            warn!("{}", e);
        }
        *slot.lock() = Some(result);
    }
}

fn write_exr(buffers: &RenderBuffers, path: &Path) -> pathtrace::Result<()> {
    let params = buffers.params();
    let pixels = buffers.read().get_combined_pixels();

    let image = image::Rgba32FImage::from_raw(params.width, params.height, pixels)
        .ok_or_else(|| pathtrace::Error::other("combined pass does not match frame size"))?;
    image::DynamicImage::ImageRgba32F(image)
        .save(path)
        .map_err(|e| pathtrace::Error::other(format!("failed to write {}: {}", path.display(), e)))?;

    info!("wrote {}", path.display());
    Ok(())
}
