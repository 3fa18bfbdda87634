use argh::FromArgs;
use std::fs::File;
use std::path::Path;
use stegano_jpeg::{parse_quantization_tables, Coder, JpegCoder, Result, ScanResult};
use tabled::builder::Builder;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(FromArgs)]
/// Inspecting jpeg image files
struct SteganoInspectArgs {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum Command {
    Quantization(QuantizationArgs),
    Scans(ScansArgs),
}

#[derive(FromArgs, PartialEq, Debug)]
/// Shows the quantization tables of jpeg files
#[argh(subcommand, name = "quantization")]
struct QuantizationArgs {
    /// the jpeg image file to inspect
    #[argh(positional)]
    jpeg_files: Vec<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Decodes the scans of jpeg files one by one and lists them
#[argh(subcommand, name = "scans")]
struct ScansArgs {
    /// abort on the first scan that fails to decode
    #[argh(switch)]
    strict: bool,

    /// the jpeg image file to inspect
    #[argh(positional)]
    jpeg_files: Vec<String>,
}

#[derive(Tabled)]
struct ScanRow {
    #[tabled(rename = "#")]
    index: usize,
    offset: u64,
    components: String,
    #[tabled(rename = "Ss..Se")]
    band: String,
    #[tabled(rename = "Ah/Al")]
    approximation: String,
    blocks: usize,
    touched: usize,
}

impl From<&ScanResult> for ScanRow {
    fn from(scan: &ScanResult) -> Self {
        ScanRow {
            index: scan.index,
            offset: scan.offset,
            components: scan
                .component_ids
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(","),
            band: format!("{}..{}", scan.spectral_start, scan.spectral_end),
            approximation: format!("{}/{}", scan.approx_high, scan.approx_low),
            blocks: scan.blocks_decoded,
            touched: scan.coefficients_touched,
        }
    }
}

fn display_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

/// Rows `y0..y7`, columns `x0..x7`.
fn quantization_table(rows: &[[u16; 8]; 8]) -> Table {
    let mut builder = Builder::default();
    builder.push_record(std::iter::once(String::new()).chain((0..8).map(|x| format!("x{x}"))));
    for (y, row) in rows.iter().enumerate() {
        builder.push_record(std::iter::once(format!("y{y}")).chain(row.iter().map(u16::to_string)));
    }
    let mut table = builder.build();
    table.with(Style::markdown());
    table
}

fn show_quantization(file_name: &str) -> Result<()> {
    let tables = parse_quantization_tables(File::open(file_name)?)?;

    println!("# Quantization Tables of `{}`", display_name(file_name));
    println!();
    for table in &tables {
        println!(
            "## Table {} (precision: {}-bit)",
            table.id,
            if table.precision == 0 { 8 } else { 16 }
        );
        println!("{}", quantization_table(&table.natural_rows()));
        println!();
    }
    Ok(())
}

fn show_scans(file_name: &str, strict: bool) -> Result<()> {
    let mut coder = JpegCoder::open(File::open(file_name)?);
    let working_set = coder.load_working_set()?;
    let frame = working_set.frame();

    println!("# Scans of `{}`", display_name(file_name));
    println!();
    println!(
        "{:?} frame {}x{}, {} components, {} blocks, restart interval {}",
        frame.process,
        frame.width,
        frame.height,
        frame.components.len(),
        working_set.coefficients().total_blocks(),
        working_set.restart_interval()
    );
    println!();

    let mut rows = Vec::new();
    loop {
        match coder.load_scan() {
            Ok(scan) => rows.push(ScanRow::from(&scan)),
            Err(e) if e.is_no_more_scans() => break,
            Err(e) if !strict && e.is_recoverable() => log::warn!("{file_name}: {e}"),
            Err(e) => {
                coder.close();
                return Err(e);
            }
        }
    }
    coder.close();

    println!("{}", Table::new(rows).with(Style::markdown()));
    println!();
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args: SteganoInspectArgs = argh::from_env();

    match &args.command {
        Command::Quantization(args) => {
            for file_name in args.jpeg_files.iter() {
                show_quantization(file_name)?;
            }
        }
        Command::Scans(args) => {
            for file_name in args.jpeg_files.iter() {
                show_scans(file_name, args.strict)?;
            }
        }
    }
    Ok(())
}
