//! Builds a file map from the command line, installs it through the control
//! interface, reads it back and resolves offsets.
//!
//!   fmap_tool simple --size 0x300000 --extent 0:0x200000:0x200000 --extent 0:0x600000:0x200000
//!   fmap_tool striped --size 0x800000 --chunk 0x200000 --strip 0:0:0x400000 --strip 1:0:0x400000 --resolve 0x200000

use clap::{Parser, Subcommand, ValueEnum};
use famfs::{
    ioctl::ioctl,
    user::{BufferArena, NoUserMemory},
    wire::{
        self,
        v1::IocMap,
        v2::{CreateBody, CreateRequest, IocGetFmap},
        MapCodec, V2,
    },
    FileKind, FileMeta, FmapError, SimpleExtent,
};
use log::info;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    layout: Layout,

    #[arg(long, global = true, value_enum, default_value = "regular")]
    kind: Kind,

    /// Install through the v1 opcode (simple maps on device 0 only)
    #[arg(long, global = true)]
    v1: bool,

    /// Logical offsets to translate
    #[arg(long, global = true, value_parser = parse_num)]
    resolve: Vec<u64>,

    /// Print the installed map as a JSON record
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Layout {
    /// Extents laid end to end
    Simple {
        #[arg(long, value_parser = parse_num)]
        size: u64,
        /// dev:offset:length
        #[arg(long = "extent", value_parser = parse_extent, required = true)]
        extents: Vec<SimpleExtent>,
    },
    /// One extent striped across devices
    Striped {
        #[arg(long, value_parser = parse_num)]
        size: u64,
        #[arg(long, value_parser = parse_num)]
        chunk: u64,
        /// Striped length, defaults to the file size
        #[arg(long, value_parser = parse_num)]
        nbytes: Option<u64>,
        /// dev:offset:length
        #[arg(long = "strip", value_parser = parse_extent, required = true)]
        strips: Vec<SimpleExtent>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Regular,
    Superblock,
    Log,
}

impl From<Kind> for FileKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Regular => FileKind::Regular,
            Kind::Superblock => FileKind::Superblock,
            Kind::Log => FileKind::Log,
        }
    }
}

fn parse_num(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("{s}: {e}"))
}

fn parse_extent(s: &str) -> Result<SimpleExtent, String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [dev, off, len] => Ok(SimpleExtent::new(
            parse_num(dev)?,
            parse_num(off)?,
            parse_num(len)?,
        )),
        _ => Err(format!("{s}: expected dev:offset:length")),
    }
}

fn install(cli: &Cli, meta: &FileMeta) -> Result<(), FmapError> {
    let file_kind = FileKind::from(cli.kind);
    let request = match &cli.layout {
        Layout::Simple { size, extents } => CreateRequest {
            file_size: *size,
            file_kind,
            body: CreateBody::Simple(extents.clone()),
        },
        Layout::Striped {
            size,
            chunk,
            nbytes,
            strips,
        } => CreateRequest {
            file_size: *size,
            file_kind,
            body: CreateBody::Interleaved {
                nstrips: strips.len() as u64,
                chunk_size: *chunk,
                nbytes: nbytes.unwrap_or(*size),
                strips: strips.clone(),
            },
        },
    };

    if cli.v1 {
        let map = request.to_file_map()?;
        let mut arg = IocMap::from_file_map(&map)?.to_bytes();
        ioctl(meta, wire::MAP_CREATE, &mut arg, &NoUserMemory)
    } else {
        let mut arena = BufferArena::new();
        let mut arg = request.stage(&mut arena)?;
        ioctl(meta, wire::MAP_CREATE_V2, &mut arg, &arena)
    }
}

fn run(cli: &Cli) -> Result<(), FmapError> {
    let meta = FileMeta::new();
    install(cli, &meta)?;
    info!("map installed");

    let mut out = [0u8; IocGetFmap::SIZE];
    ioctl(&meta, wire::MAP_GET_V2, &mut out, &NoUserMemory)?;
    let map = V2::decode_get(&out)?;
    println!(
        "KABI {}: {:?} file, {} bytes, {:?} extents, capacity {}",
        famfs::KABI_VERSION,
        map.file_kind,
        map.file_size,
        map.extent_kind,
        map.capacity_bytes()
    );
    if cli.json {
        let rec = map.to_record()?;
        println!("{}", String::from_utf8_lossy(&rec));
    }

    for &offset in &cli.resolve {
        match meta.resolve(offset) {
            Ok(res) => println!(
                "{:#x}: dev {} @ {:#x}, {} bytes",
                offset, res.device_index, res.physical_offset, res.run_length
            ),
            Err(e) => println!("{:#x}: {}", offset, e),
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("fmap_tool: {} (errno {})", e, e.errno());
        std::process::exit(1);
    }
}
