use argh::FromArgs;
use indicatif::ProgressBar;
use memzip::{FileOptions, ZipReader, ZipWriter};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;

/// List, verify, extract or create zip files
#[derive(FromArgs)]
struct Args {
    /// the zip file to read, or to create with --pack
    #[argh(positional)]
    filename: PathBuf,
    /// list the files in the zip file
    #[argh(switch, short = 'l')]
    list_files: bool,
    /// decompress every entry and check its crc32
    #[argh(switch, short = 't')]
    test: bool,
    /// extract the files to the given directory
    #[argh(option, short = 'x')]
    extract_to: Option<PathBuf>,
    /// create the zip file from the contents of the given directory
    #[argh(option, short = 'p')]
    pack: Option<PathBuf>,
}

fn main() {
    let args: Args = argh::from_env();

    if let Some(source) = args.pack {
        pack(&source, &args.filename);
        return;
    }

    let buffer = fs::read(&args.filename).unwrap_or_else(|e| {
        println!("Error: {}", e);
        exit(1);
    });
    let zip = ZipReader::new(buffer).unwrap_or_else(|e| {
        println!("Error: ({:0X}):{}", e.error_code(), e);
        exit(1);
    });

    if args.list_files {
        list_files(&zip);
    }

    if args.test {
        test_files(&zip);
    }

    if let Some(where_to) = args.extract_to {
        extract_files(&zip, &where_to);
    }
}

fn list_files(zip: &ZipReader<Vec<u8>>) {
    for entry in zip.entries() {
        if entry.is_directory {
            println!("directory: {:?}", entry.file_name);
        } else {
            println!(
                "file: {:?}, size: {}, comp.size: {}, comp.method: {:?}, crc32: {:08X}",
                entry.file_name,
                entry.uncompressed_size,
                entry.compressed_size,
                entry.compression_method,
                entry.crc32
            );
        }
    }
}

fn test_files(zip: &ZipReader<Vec<u8>>) {
    let pb = ProgressBar::new(zip.len() as u64);
    let mut failed = 0;
    for entry in zip.entries() {
        if let Err(e) = zip.read_entry(entry) {
            pb.println(format!("{}: {}", entry.file_name, e));
            failed += 1;
        }
        pb.inc(1);
    }
    pb.finish();
    println!("{} entries, {} failed", zip.len(), failed);
}

fn extract_files(zip: &ZipReader<Vec<u8>>, where_to: &Path) {
    let files = zip.extract_all().unwrap_or_else(|e| {
        println!("Error: ({:0X}):{}", e.error_code(), e);
        exit(1);
    });

    let pb = ProgressBar::new(files.len() as u64);
    for (name, data) in files {
        let path = where_to.join(&name);
        if name.ends_with('/') {
            fs::create_dir_all(&path).unwrap();
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, data).unwrap();
        }
        pb.inc(1);
    }
    pb.finish();
}

fn pack(source: &Path, target: &Path) {
    let mut writer = ZipWriter::new();
    let mut pending = vec![source.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut children = fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect::<Vec<_>>();
        children.sort();
        for path in children {
            let name = path
                .strip_prefix(source)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            if path.is_dir() {
                writer.add_directory(&name).unwrap();
                pending.push(path);
            } else {
                let data = fs::read(&path).unwrap();
                writer.add_file(&name, &data, FileOptions::default()).unwrap();
            }
        }
    }
    fs::write(target, writer.finalize().unwrap()).unwrap();
    println!("{} entries written to {:?}", writer.len(), target);
}
