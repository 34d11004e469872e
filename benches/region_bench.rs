use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use mmap_ipc::{ChannelAdapter, MappedRegion, RegionFlags};
use std::fs;
use std::path::PathBuf;

// Simple helper to build a unique temp path per bench
fn tmp_path(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("mmap_ipc_bench_{}_{}", name, std::process::id()));
    p
}

fn rw_shared() -> RegionFlags {
    RegionFlags::READ_WRITE | RegionFlags::SHARED
}

fn bench_open_close(b: &mut Criterion) {
    let mut group = b.benchmark_group("open_close");
    for &count in &[16_usize, 4 * 1024, 64 * 1024] {
        group.throughput(Throughput::Bytes(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |ben, &n| {
            ben.iter_batched(
                || {
                    let path = tmp_path(&format!("open_close_{n}"));
                    let _ = fs::remove_file(&path);
                    path
                },
                |path| {
                    let mut region = MappedRegion::<u8>::new();
                    region.open(&path, rw_shared(), n, 0).expect("open");
                    region.close();
                    let _ = fs::remove_file(&path);
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_element_ops(b: &mut Criterion) {
    let mut group = b.benchmark_group("element_ops");
    for &count in &[16_usize, 4 * 1024, 64 * 1024] {
        group.throughput(Throughput::Bytes(count as u64));
        group.bench_with_input(BenchmarkId::new("set", count), &count, |ben, &n| {
            let path = tmp_path(&format!("set_{n}"));
            let _ = fs::remove_file(&path);
            let mut region = MappedRegion::<u8>::new();
            region.open(&path, rw_shared(), n, 0).expect("open");

            ben.iter(|| {
                for i in 0..n {
                    region.set(i, 0xab);
                }
            });

            region.close();
            let _ = fs::remove_file(&path);
        });

        group.bench_with_input(BenchmarkId::new("get", count), &count, |ben, &n| {
            let path = tmp_path(&format!("get_{n}"));
            let _ = fs::remove_file(&path);
            let mut region = MappedRegion::<u8>::new();
            region.open(&path, rw_shared(), n, 0).expect("open");
            for i in 0..n {
                region.set(i, 0xcd);
            }

            ben.iter(|| {
                let mut sum = 0u64;
                for i in 0..n {
                    sum += u64::from(region.get(i, 0));
                }
                criterion::black_box(sum);
            });

            region.close();
            let _ = fs::remove_file(&path);
        });
    }
    group.finish();
}

fn bench_sync(b: &mut Criterion) {
    let mut group = b.benchmark_group("sync");
    group.bench_function("dirty_4KB", |ben| {
        let path = tmp_path("sync_dirty");
        let _ = fs::remove_file(&path);
        let mut region = MappedRegion::<u8>::new();
        region.open(&path, rw_shared(), 4 * 1024, 0).expect("open");

        ben.iter(|| {
            region.set(0, 0x11);
            criterion::black_box(region.sync());
        });

        region.close();
        let _ = fs::remove_file(&path);
    });
    group.finish();
}

fn bench_channel_words(b: &mut Criterion) {
    let mut group = b.benchmark_group("channel_words");
    group.bench_function("mirror_pass", |ben| {
        let dir = tmp_path("channel_words_dir");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("bench dir");
        let mut adapter = ChannelAdapter::new(&dir);
        adapter.open().expect("open");

        // One polling pass of the demo loop: read peer word, mirror it
        // back with the counter nybble kept.
        ben.iter(|| {
            let outputs = adapter.outputs();
            adapter.set_inputs_masked(outputs, 0x0f);
            criterion::black_box(adapter.inputs());
        });

        adapter.close();
        let _ = fs::remove_dir_all(&dir);
    });
    group.finish();
}

fn criterion_config() -> Criterion {
    Criterion::default()
        .sample_size(30)
        .warm_up_time(std::time::Duration::from_millis(300))
        .measurement_time(std::time::Duration::from_secs(3))
}

criterion_group! {
    name = region_benches;
    config = criterion_config();
    targets =
        bench_open_close,
        bench_element_ops,
        bench_sync,
        bench_channel_words
}

criterion_main!(region_benches);
