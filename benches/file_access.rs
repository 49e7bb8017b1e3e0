use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flate2::{write::GzEncoder, Compression};
use std::io::Write;
use tempfile::NamedTempFile;
use unifile::{Format, Handle, Mode};

fn log_lines(size_kb: usize) -> Vec<u8> {
    let target_size = size_kb * 1024;
    let mut content = Vec::new();
    let mut line_num = 0;
    while content.len() < target_size {
        let log_line = format!(
            "[2024-09-02T10:{}:{}] INFO: Request {} user_{}\n",
            (line_num / 3600) % 24,
            (line_num / 60) % 60,
            line_num,
            line_num % 1000
        );
        content.extend_from_slice(log_line.as_bytes());
        line_num += 1;
    }
    content
}

fn create_test_file(size_kb: usize) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file.write_all(&log_lines(size_kb)).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

fn create_compressed_test_file(size_kb: usize) -> NamedTempFile {
    let compressed_file = NamedTempFile::new().unwrap();
    let file = std::fs::File::create(compressed_file.path()).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&log_lines(size_kb)).unwrap();
    encoder.finish().unwrap();
    compressed_file
}

fn bench_line_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_reads");
    group.sample_size(10);
    group.measurement_time(std::time::Duration::from_secs(5));

    let sizes_kb = [50, 500, 5000];

    for &size_kb in &sizes_kb {
        let size_label = if size_kb < 1024 {
            format!("{}KB", size_kb)
        } else {
            format!("{}MB", size_kb / 1024)
        };

        let temp_file = create_test_file(size_kb);
        group.bench_with_input(
            BenchmarkId::new("uncompressed", &size_label),
            &temp_file,
            |b, file| {
                b.iter(|| {
                    let handle = Handle::open_with(file.path(), Mode::Read, Format::Raw).unwrap();
                    let mut line = Vec::new();
                    let mut lines = 0u64;
                    while handle.read_line_dynamic(&mut line).unwrap() {
                        lines += 1;
                    }
                    handle.close().unwrap();
                    black_box(lines);
                });
            },
        );

        let compressed_file = create_compressed_test_file(size_kb);
        group.bench_with_input(
            BenchmarkId::new("gzip", &size_label),
            &compressed_file,
            |b, file| {
                b.iter(|| {
                    let handle = Handle::open_with(file.path(), Mode::Read, Format::Gzip).unwrap();
                    let mut line = Vec::new();
                    let mut lines = 0u64;
                    while handle.read_line_dynamic(&mut line).unwrap() {
                        lines += 1;
                    }
                    handle.close().unwrap();
                    black_box(lines);
                });
            },
        );
    }

    group.finish();
}

fn bench_record_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_reads");
    group.sample_size(10);

    let temp_file = create_test_file(500);
    let file_len = std::fs::metadata(temp_file.path()).unwrap().len() as usize;
    let record_count = file_len / 64;

    group.bench_function("uncompressed_64b_records", |b| {
        let mut dest = vec![0u8; record_count * 64];
        b.iter(|| {
            let handle = Handle::open_with(temp_file.path(), Mode::Read, Format::Raw).unwrap();
            let got = handle.read_records(&mut dest, 64, record_count).unwrap();
            handle.close().unwrap();
            black_box(got);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_line_reads, bench_record_reads);
criterion_main!(benches);
