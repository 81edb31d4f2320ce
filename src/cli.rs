use crate::pdf::DEFAULT_SCALE;
use crate::session::PresentationMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pagepick")]
#[command(about = "Preview PDF pages, pick a subset, and reassemble them into a new PDF")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as MCP server holding one interactive selection session
    Mcp {
        /// Preview layout
        #[arg(long, value_enum, default_value_t = PresentationMode::Single)]
        mode: PresentationMode,

        /// Preview scale factor
        #[arg(long, default_value_t = DEFAULT_SCALE)]
        scale: f32,
    },

    /// Select pages and write them, in original order, to reassembled.pdf
    Pick {
        /// PDF file to pick pages from
        path: PathBuf,

        /// Page ranges (e.g., "1-5,10,15-end")
        pages: String,

        /// Directory to write reassembled.pdf into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Also write PNG previews of the rendered pages here
        #[arg(long)]
        preview_dir: Option<PathBuf>,

        /// Preview layout
        #[arg(long, value_enum, default_value_t = PresentationMode::Single)]
        mode: PresentationMode,

        /// Preview scale factor
        #[arg(long, default_value_t = DEFAULT_SCALE)]
        scale: f32,
    },

    /// Render page previews to PNG files
    Preview {
        /// PDF file to preview
        path: PathBuf,

        /// Only this page (1-based); all pages if omitted
        #[arg(short, long)]
        page: Option<u32>,

        /// Output directory
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Preview scale factor
        #[arg(long, default_value_t = DEFAULT_SCALE)]
        scale: f32,
    },
}
