use std::path::Path;
use std::thread;

use anyhow::{bail, Context, Result};

use wtl_nodes::effect::{Frame, NodeKind};
use wtl_nodes::host::NodeHost;
use wtl_nodes::node::ApplyType;
use wtl_nodes::settings::ServerConfig;

const USAGE: &str = "usage: wtl-nodes [demo <node-code> <in.png> <out.png> [--apply-type none|auto_apply|apply_all] [--compare] [--depth <depth.png>]]";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut host = NodeHost::new(ServerConfig::load());
    match args.first().map(String::as_str) {
        None => {
            if host.start()?.is_none() {
                bail!("control server is disabled in {}", ServerConfig::config_path().display());
            }
            log::info!("Waiting for nodes; Ctrl-C to exit");
            loop {
                thread::park();
            }
        }
        Some("demo") => {
            host.start()?;
            run_demo(&host, &args[1..])
        }
        Some("--help" | "-h") => {
            println!("{USAGE}");
            Ok(())
        }
        Some(other) => bail!("unknown command '{other}'\n{USAGE}"),
    }
}

fn run_demo(host: &NodeHost, args: &[String]) -> Result<()> {
    let [code, input, output, rest @ ..] = args else {
        bail!("{USAGE}");
    };
    let kind = NodeKind::from_code(code).with_context(|| format!("unknown node code '{code}'"))?;

    let mut apply_type = ApplyType::PerItem;
    let mut compare = false;
    let mut depth = Vec::new();
    let mut flags = rest.iter();
    while let Some(flag) = flags.next() {
        match flag.as_str() {
            "--apply-type" => {
                let value = flags.next().context("--apply-type needs a value")?;
                apply_type = value.parse().map_err(anyhow::Error::msg)?;
            }
            "--compare" => compare = true,
            "--depth" => {
                let path = flags.next().context("--depth needs a path")?;
                depth.push(load_frame(Path::new(path), true)?);
            }
            other => bail!("unknown option '{other}'\n{USAGE}"),
        }
    }

    let frame = load_frame(Path::new(input), kind.is_mask())?;
    log::info!(
        "{} on {input} ({}x{}); open the control panel and press apply or skip",
        kind.display_name(),
        frame.width,
        frame.height
    );
    let out = host.run_node(
        kind,
        Some("demo"),
        &[frame],
        &kind.default_values(),
        host.options(apply_type, compare),
        &depth,
    )?;

    let result = out.images.first().context("node returned an empty batch")?;
    save_frame(result, Path::new(output))?;
    // Extra mask outputs land next to the image as `<out>.mask<N>.png`.
    for (index, masks) in out.masks.iter().enumerate() {
        if let Some(mask) = masks.first() {
            save_frame(mask, &Path::new(output).with_extension(format!("mask{index}.png")))?;
        }
    }
    Ok(())
}

fn save_frame(frame: &Frame, path: &Path) -> Result<()> {
    let rgb = frame
        .to_rgb8()
        .with_context(|| format!("cannot write a {}-channel result", frame.channels))?;
    rgb.save(path).with_context(|| format!("writing {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn load_frame(path: &Path, gray: bool) -> Result<Frame> {
    let img = image::open(path).with_context(|| format!("reading {}", path.display()))?;
    let frame = Frame::from_rgb8(&img.to_rgb8());
    Ok(if gray { frame.to_gray() } else { frame })
}
