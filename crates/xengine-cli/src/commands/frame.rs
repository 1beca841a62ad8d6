//! Headless frame runs: load a map, tick and render N frames

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use xengine_core::{Color, GameTime};
use xengine_game::{EngineConfig, FrameStats, GameContext};
use xengine_gpu::{GpuBackend, RecordingBackend};
use xengine_render::{FrameStats as GpuFrameStats, WgpuBackend};

const FRAME_DELTA: f32 = 1.0 / 60.0;

pub struct FrameArgs {
    pub map: PathBuf,
    pub config: PathBuf,
    pub assets: Option<PathBuf>,
    pub frames: u32,
    pub gpu: bool,
    pub out: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default)]
struct RunTotals {
    frames: u32,
    draw_calls: usize,
    culled: usize,
    swept: usize,
    last: FrameStats,
}

/// Split the map argument into an asset root and a map name under it
fn resolve_map(map: &Path, assets: Option<&Path>) -> Result<(PathBuf, String)> {
    match assets {
        Some(root) => Ok((root.to_path_buf(), map.to_string_lossy().into_owned())),
        None => {
            let name = map
                .file_name()
                .with_context(|| format!("'{}' does not name a map file", map.display()))?;
            let root = map.parent().map(Path::to_path_buf).unwrap_or_default();
            Ok((root, name.to_string_lossy().into_owned()))
        }
    }
}

/// Where frames go: brackets each rendered frame
trait FrameTarget {
    fn backend(&mut self) -> &mut dyn GpuBackend;
    fn begin(&mut self) {}
    fn end(&mut self) {}
}

impl FrameTarget for RecordingBackend {
    fn backend(&mut self) -> &mut dyn GpuBackend {
        self
    }

    fn end(&mut self) {
        self.take_draws();
    }
}

struct WgpuTarget {
    gpu: WgpuBackend,
    clear: Color,
    last: Option<GpuFrameStats>,
}

impl FrameTarget for WgpuTarget {
    fn backend(&mut self) -> &mut dyn GpuBackend {
        &mut self.gpu
    }

    fn begin(&mut self) {
        self.gpu.begin_frame(self.clear);
    }

    fn end(&mut self) {
        self.last = Some(self.gpu.end_frame());
    }
}

fn run_frames(ctx: &mut GameContext, frames: u32, target: &mut impl FrameTarget) -> RunTotals {
    let mut totals = RunTotals::default();
    let mut time = GameTime::default();
    for _ in 0..frames {
        time.delta = FRAME_DELTA;
        time.total += FRAME_DELTA;
        ctx.frame_update(FRAME_DELTA);

        target.begin();
        let stats = ctx.render_frame(time, target.backend());
        target.end();

        log::debug!("frame {}: {:?}", totals.frames, stats);
        totals.frames += 1;
        totals.draw_calls += stats.sky_draws + stats.scene.draw_calls + stats.bullet_draws;
        totals.culled += stats.scene.culled;
        totals.swept += stats.swept;
        totals.last = stats;
    }
    totals
}

fn report(totals: &RunTotals) {
    println!("Rendered {} frames", totals.frames);
    if totals.frames > 0 {
        let last = &totals.last;
        println!(
            "  last frame: {} groups, {} nodes, {} culled, {} draw calls, {} sky draws, {} bullet draws",
            last.scene.groups,
            last.scene.nodes,
            last.scene.culled,
            last.scene.draw_calls,
            last.sky_draws,
            last.bullet_draws
        );
        println!(
            "  average: {:.1} draw calls, {:.1} culled nodes per frame; {} resources swept",
            totals.draw_calls as f32 / totals.frames as f32,
            totals.culled as f32 / totals.frames as f32,
            totals.swept
        );
    }
}

pub fn run(args: FrameArgs) -> Result<()> {
    let mut config = EngineConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    let (root, map_name) = resolve_map(&args.map, args.assets.as_deref())?;
    config.asset_root = root;
    if args.out.is_some() && !args.gpu {
        bail!("--out needs --gpu");
    }
    let clear = config
        .fog
        .as_ref()
        .map(|fog| fog.to_range().color)
        .unwrap_or(Color::BLACK);

    let mut ctx = GameContext::new(config);

    if args.gpu {
        let gpu = WgpuBackend::headless(args.width, args.height).context("Failed to create wgpu backend")?;
        ctx.camera_mut().aspect = gpu.context().aspect_ratio();
        let mut target = WgpuTarget { gpu, clear, last: None };
        ctx.load_content(&map_name, &mut target.gpu)
            .with_context(|| format!("Failed to load map {}", map_name))?;

        let totals = run_frames(&mut ctx, args.frames, &mut target);
        report(&totals);
        if let Some(stats) = target.last {
            println!("  gpu: {} draws, {} pipelines", stats.draws, stats.pipelines);
        }

        if let Some(out) = &args.out {
            let pixels = target.gpu.read_pixels().context("Failed to read rendered pixels")?;
            let img = image::RgbaImage::from_raw(args.width, args.height, pixels)
                .context("Failed to create image from pixel data")?;
            img.save(out).with_context(|| format!("Failed to save image to {}", out.display()))?;
            println!("Wrote {}x{} image to {}", args.width, args.height, out.display());
        }
        ctx.shutdown(&mut target.gpu);
    } else {
        let mut gpu = RecordingBackend::new();
        ctx.load_content(&map_name, &mut gpu)
            .with_context(|| format!("Failed to load map {}", map_name))?;
        let totals = run_frames(&mut ctx, args.frames, &mut gpu);
        report(&totals);
        ctx.shutdown(&mut gpu);
        println!("  {} buffers still alive after shutdown", gpu.live_buffer_count());
    }
    Ok(())
}
