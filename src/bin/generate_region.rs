//! Region generator binary — generates an N x N region of terrain chunks.
//!
//! Usage: cargo run --release --bin generate_region -- [OPTIONS]
//!
//! Options:
//!   --size <N>        Region side length in chunks (default: 4)
//!   --config <PATH>   Generation constants JSON (default: built-in values)
//!   --cache <DIR>     Kernel binary cache directory (default: .kernel_cache)

use std::path::PathBuf;
use std::time::{Duration, Instant};

use skyterra::generation::{GenerationConstants, GenerationContext};
use skyterra::gpu::GpuContext;
use skyterra::streaming::ChunkScheduler;
use skyterra::terrain::ChunkCoordinate;

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let size = parse_usize_arg(&args, "--size").unwrap_or(4);
    let config = parse_str_arg(&args, "--config");
    let cache_dir = parse_str_arg(&args, "--cache")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".kernel_cache"));

    let constants = match &config {
        Some(path) => GenerationConstants::load(std::path::Path::new(path))
            .expect("Failed to load generation constants"),
        None => GenerationConstants::default(),
    };

    println!("=== Skyterra Region Generator ===");
    println!("Region: {} x {} chunks", size, size);
    println!(
        "Chunk:  {} blocks ({}m)",
        constants.chunk_width_in_blocks,
        constants.chunk_width_in_meters()
    );
    println!("Cache:  {}", cache_dir.display());
    println!();

    let gpu = GpuContext::new_blocking().expect("Failed to create GPU context");
    let context = GenerationContext::new(&gpu, constants, &cache_dir)
        .expect("Failed to build generation context");
    let mut scheduler = ChunkScheduler::new(context).expect("Failed to start scheduler");

    let start = Instant::now();
    for x in 0..size as i32 {
        for z in 0..size as i32 {
            scheduler.request(ChunkCoordinate::new(x, z));
        }
    }

    while scheduler.pending_count() > 0 {
        scheduler.update();
        std::thread::sleep(Duration::from_millis(10));
    }

    let elapsed = start.elapsed();
    let loaded = scheduler.loaded();
    {
        let chunks = loaded.lock().unwrap();
        let total_verts: u64 = chunks.iter().map(|c| c.vertex_count as u64).sum();
        let total_tris: u64 = chunks.iter().map(|c| c.triangle_count() as u64).sum();
        println!();
        println!(
            "Generated {} chunks in {:.2?} ({:.1} ms/chunk)",
            chunks.len(),
            elapsed,
            elapsed.as_secs_f64() * 1000.0 / chunks.len().max(1) as f64
        );
        println!("Totals: {} vertices, {} triangles", total_verts, total_tris);
    }

    scheduler.shutdown();
}

fn parse_str_arg(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_usize_arg(args: &[String], name: &str) -> Option<usize> {
    parse_str_arg(args, name).and_then(|v| v.parse().ok())
}
