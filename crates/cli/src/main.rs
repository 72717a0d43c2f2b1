use exam_restore_core::{
    encoding::decode_image,
    init,
    workflow::{restored_filename, Session, Step},
    DisplaySize, ExamRestore, Point,
};
use anyhow::{bail, Context, Result};
use arboard::{Clipboard, ImageData};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Photo of the exam paper to restore
    image: PathBuf,

    /// Start of the selection drag, as X,Y in display pixels
    #[arg(long, value_parser = parse_point)]
    from: Option<Point>,

    /// End of the selection drag, as X,Y in display pixels
    #[arg(long, value_parser = parse_point, requires = "from")]
    to: Option<Point>,

    /// Size the selection coordinates refer to, as WIDTHxHEIGHT (defaults to the image size)
    #[arg(long, value_parser = parse_display)]
    display: Option<DisplaySize>,

    /// Directory to write restored-exam.<ext> into. An existing file of that
    /// name is overwritten, including by each re-process pass.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Override the model defined in .env or settings
    #[arg(short, long)]
    model: Option<String>,

    /// Copy the restored image to the clipboard
    #[arg(short, long, default_value_t = false)]
    copy: bool,

    /// Never ask questions; fail on the first restoration error
    #[arg(long, default_value_t = false)]
    no_prompt: bool,

    /// Remember the model and output directory for next time
    #[arg(long, default_value_t = false)]
    save_settings: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup
    init();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    // Config from env, then saved settings, then CLI overrides
    let mut app =
        ExamRestore::new(args.model.clone()).context("Failed to initialize Gemini client")?;
    if !app.config().has_api_key() {
        warn!("GEMINI_API_KEY is not set; restoration requests will be rejected");
    }
    let out_dir = args
        .out
        .clone()
        .or_else(|| app.settings().output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    if args.save_settings {
        app.remember(out_dir.clone())
            .save()
            .context("Failed to save settings")?;
    }

    let model_name = app.config().model_name.clone();

    // Upload
    let mut session = Session::new();
    session
        .upload_file(&args.image)
        .with_context(|| format!("Failed to load {}", args.image.display()))?;

    // Crop
    if let Some(size) = args.display {
        session.set_display_size(size);
    }
    if let Some(from) = args.from {
        session.begin_selection(from);
        if let Some(to) = args.to {
            session.update_selection(to);
        }
        session.end_selection();
    }

    loop {
        describe_source(&session);

        // Restore
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                .template("{spinner:.green} {msg}")?,
        );
        spinner.set_message(format!("Removing handwriting with {}...", model_name));
        spinner.enable_steady_tick(Duration::from_millis(100));

        let step = app.restore(&mut session).await;

        spinner.finish_and_clear();

        match step? {
            Step::Result => {
                println!("{}", save_result(&session, &out_dir)?);

                if args.copy {
                    copy_to_clipboard(&session);
                }

                if args.no_prompt || !confirm("Process this image again?")? {
                    break;
                }
                session.reprocess()?;
            }
            _ => {
                let reason = session.error().unwrap_or("unknown error").to_string();
                eprintln!("Restoration failed: {}", reason);
                if args.no_prompt || !confirm("Retry?")? {
                    bail!("Restoration failed: {}", reason);
                }
            }
        }
    }

    Ok(())
}

/// Writes the restored image into `out_dir` and describes what happened.
fn save_result(session: &Session, out_dir: &Path) -> Result<String> {
    let replaced = session
        .restored()
        .map(|restored| out_dir.join(restored_filename(restored.mime_type())).exists())
        .unwrap_or(false);

    let path = session
        .save_restored(out_dir)
        .context("Failed to save restored image")?;

    if replaced {
        Ok(format!("Restored image saved to {} (overwrote previous file)", path.display()))
    } else {
        Ok(format!("Restored image saved to {}", path.display()))
    }
}

fn describe_source(session: &Session) {
    match session.selection() {
        Some(rect) if !rect.is_degenerate() => println!(
            "Restoring selected region {}x{} at ({}, {})",
            rect.width, rect.height, rect.x, rect.y
        ),
        _ => println!("Restoring the full page"),
    }
}

/// Asks a yes/no question on stdin. Anything but "y"/"yes" means no.
fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N]: ", question);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn copy_to_clipboard(session: &Session) {
    let Some(restored) = session.restored() else {
        return;
    };
    let pixels = match decode_image(restored) {
        Ok(image) => image.to_rgba8(),
        Err(e) => {
            warn!("Failed to decode restored image for the clipboard: {}", e);
            return;
        }
    };

    let image = ImageData {
        width: pixels.width() as usize,
        height: pixels.height() as usize,
        bytes: Cow::Owned(pixels.into_raw()),
    };
    match Clipboard::new() {
        Ok(mut clipboard) => {
            if let Err(e) = clipboard.set_image(image) {
                eprintln!("Warning: Failed to copy to clipboard: {}", e);
            } else {
                println!("(Copied to clipboard)");
            }
        }
        Err(e) => eprintln!("Warning: Could not access clipboard: {}", e),
    }
}

fn parse_point(s: &str) -> std::result::Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got `{}`", s))?;
    let x = x.trim().parse::<f32>().map_err(|e| format!("bad X: {}", e))?;
    let y = y.trim().parse::<f32>().map_err(|e| format!("bad Y: {}", e))?;
    Ok(Point::new(x, y))
}

fn parse_display(s: &str) -> std::result::Result<DisplaySize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT but got `{}`", s))?;
    let width = w.trim().parse::<f32>().map_err(|e| format!("bad width: {}", e))?;
    let height = h.trim().parse::<f32>().map_err(|e| format!("bad height: {}", e))?;
    if width <= 0.0 || height <= 0.0 {
        return Err("display size must be positive".to_string());
    }
    Ok(DisplaySize::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_parse_with_spaces() {
        assert_eq!(parse_point("10, 20.5").unwrap(), Point::new(10.0, 20.5));
        assert!(parse_point("10").is_err());
        assert!(parse_point("a,b").is_err());
    }

    #[test]
    fn display_sizes_parse() {
        assert_eq!(parse_display("800x600").unwrap(), DisplaySize::new(800.0, 600.0));
        assert_eq!(parse_display("800X600").unwrap(), DisplaySize::new(800.0, 600.0));
        assert!(parse_display("0x600").is_err());
        assert!(parse_display("800").is_err());
    }

    #[test]
    fn args_accept_a_drag() {
        let args = Args::try_parse_from([
            "exam-restore",
            "page.jpg",
            "--from",
            "10,10",
            "--to",
            "50,50",
            "--no-prompt",
        ])
        .unwrap();
        assert_eq!(args.from, Some(Point::new(10.0, 10.0)));
        assert_eq!(args.to, Some(Point::new(50.0, 50.0)));
        assert!(args.no_prompt);
    }

    fn finished_session(dir: &Path) -> Session {
        let page = image::RgbaImage::from_pixel(24, 24, image::Rgba([250, 250, 250, 255]));
        let mut bytes = Vec::new();
        page.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let upload = dir.join("page.png");
        std::fs::write(&upload, &bytes).unwrap();

        let mut session = Session::new();
        session.upload_file(&upload).unwrap();
        let job = session.begin_restore().unwrap();
        let restored = job.source.clone();
        session.complete_restore(&job, Ok(restored)).unwrap();
        session
    }

    #[test]
    fn saving_again_reports_the_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = finished_session(dir.path());

        let first = save_result(&session, dir.path()).unwrap();
        assert!(first.ends_with("restored-exam.png"), "{first}");

        session.reprocess().unwrap();
        let job = session.begin_restore().unwrap();
        let restored = job.source.clone();
        session.complete_restore(&job, Ok(restored)).unwrap();

        let second = save_result(&session, dir.path()).unwrap();
        assert!(second.ends_with("(overwrote previous file)"), "{second}");
        assert!(dir.path().join("restored-exam.png").exists());
    }

    #[test]
    fn to_without_from_is_rejected() {
        assert!(Args::try_parse_from(["exam-restore", "page.jpg", "--to", "5,5"]).is_err());
    }
}
