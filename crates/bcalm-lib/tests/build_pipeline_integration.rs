//! Integration tests for the build pipeline
//!
//! These tests run the full pipeline from a k-mer file to the compacted
//! output, on both store backends.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use bcalm_lib::encoding::reverse_complement;
use bcalm_lib::{
    build_compacted_graph, BuildConfiguration, DirStore, MemoryStore, Pipeline, PipelineReport,
    RecordStore,
};
use tempfile::{NamedTempFile, TempDir};

/// Pseudo-random genome from a fixed-seed LCG
fn genome(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            b"acgt"[((state >> 33) % 4) as usize]
        })
        .collect()
}

fn canonical(kmer: &[u8]) -> Vec<u8> {
    let rc = reverse_complement(kmer).unwrap();
    if rc.as_slice() < kmer {
        rc
    } else {
        kmer.to_vec()
    }
}

/// Distinct k-mers of `sequence`, one representative per canonical form
fn distinct_kmers(sequence: &[u8], k: usize) -> Vec<Vec<u8>> {
    let mut seen = HashSet::new();
    sequence
        .windows(k)
        .filter(|kmer| seen.insert(canonical(kmer)))
        .map(<[u8]>::to_vec)
        .collect()
}

fn kmer_file(kmers: &[Vec<u8>]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for kmer in kmers {
        file.write_all(kmer).unwrap();
        file.write_all(b" 1\n").unwrap();
    }
    file.flush().unwrap();
    file
}

/// Nodes of an output file
fn read_nodes(path: &Path) -> Vec<Vec<u8>> {
    let content = fs::read(path).unwrap();
    assert!(content.ends_with(b";\n"));
    content
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| {
            assert_eq!(line.last(), Some(&b';'));
            line[..line.len() - 1].to_vec()
        })
        .collect()
}

/// Check that the output holds every input k-mer exactly once
fn assert_conserved(nodes: &[Vec<u8>], kmers: &[Vec<u8>], k: usize) {
    let mut expected: Vec<Vec<u8>> = kmers.iter().map(|kmer| canonical(kmer)).collect();
    let mut found: Vec<Vec<u8>> = nodes
        .iter()
        .inspect(|node| {
            assert!(node.len() >= k);
            assert!(node.iter().all(|b| b"acgt".contains(b)), "tag left in output");
        })
        .flat_map(|node| node.windows(k).map(canonical).collect::<Vec<_>>())
        .collect();
    expected.sort();
    found.sort();
    assert_eq!(found.len(), expected.len());
    assert_eq!(found, expected);
}

fn lexicographic(k: usize, m: usize) -> BuildConfiguration {
    BuildConfiguration {
        count_mmers: false,
        largest_bucket_dump: None,
        ..BuildConfiguration::new(k, m).unwrap()
    }
}

fn run_in_memory(config: BuildConfiguration, input: &Path, output: &Path) -> PipelineReport {
    let mut pipeline = Pipeline::new(config, MemoryStore::new()).unwrap();
    let report = pipeline.run(input, output).unwrap();
    assert!(pipeline.store().stream_names().is_empty());
    report
}

#[test]
fn test_two_isolated_kmers() {
    let mut input = NamedTempFile::new().unwrap();
    input.write_all(b"AAAAAAAAAA x\nCCCCCCCCCC y\n").unwrap();
    input.flush().unwrap();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.txt");

    let report = run_in_memory(lexicographic(10, 2), input.path(), &output);
    assert_eq!(report.num_kmers, 2);
    assert_eq!(report.num_buckets, 2);
    assert_eq!(fs::read(&output).unwrap(), b"aaaaaaaaaa;\ncccccccccc;\n");
}

#[test]
fn test_random_genome_compacts_to_one_unitig() {
    let (k, m) = (15, 2);
    let sequence = genome(5000, 42);
    let kmers = distinct_kmers(&sequence, k);
    let input = kmer_file(&kmers);
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("unitigs.txt");

    let report = run_in_memory(lexicographic(k, m), input.path(), &output);
    assert_eq!(report.num_kmers, kmers.len() as u64);
    assert!(report.num_tags > 0);

    let nodes = read_nodes(&output);
    assert_conserved(&nodes, &kmers, k);
    assert_eq!(nodes.len(), 1);
    assert!(nodes[0] == sequence || nodes[0] == reverse_complement(&sequence).unwrap());
}

#[test]
fn test_counted_order_conserves_kmers() {
    let (k, m) = (21, 3);
    let sequence = genome(3000, 7);
    let kmers = distinct_kmers(&sequence, k);
    let input = kmer_file(&kmers);
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("unitigs.txt");

    let config = BuildConfiguration { largest_bucket_dump: None, ..BuildConfiguration::new(k, m).unwrap() };
    assert!(config.count_mmers);
    let report = run_in_memory(config, input.path(), &output);
    assert_eq!(report.num_kmers, kmers.len() as u64);

    let nodes = read_nodes(&output);
    assert_conserved(&nodes, &kmers, k);
    assert!(nodes.len() * 10 < kmers.len());
}

#[test]
fn test_disk_and_memory_stores_agree() {
    let (k, m) = (15, 2);
    let sequence = genome(2000, 1234);
    let kmers = distinct_kmers(&sequence, k);
    let input = kmer_file(&kmers);
    let dir = TempDir::new().unwrap();

    let memory_output = dir.path().join("memory.txt");
    run_in_memory(lexicographic(k, m), input.path(), &memory_output);

    let disk_output = dir.path().join("disk.txt");
    let streams = dir.path().join("streams");
    let config = BuildConfiguration { tmp_dirname: Some(streams.clone()), ..lexicographic(k, m) };
    let report = build_compacted_graph(&config, input.path(), &disk_output).unwrap();
    assert!(report.exported);
    assert_eq!(DirStore::new(&streams).unwrap().stream_names().len(), 0);

    assert_eq!(fs::read(&disk_output).unwrap(), fs::read(&memory_output).unwrap());
    assert_conserved(&read_nodes(&disk_output), &kmers, k);
}

#[test]
fn test_largest_bucket_dump_is_written() {
    let (k, m) = (15, 2);
    let kmers = distinct_kmers(&genome(1000, 99), k);
    let input = kmer_file(&kmers);
    let dir = TempDir::new().unwrap();
    let dump = dir.path().join("largest_bucket.dot");
    let config = BuildConfiguration {
        largest_bucket_dump: Some(dump.clone()),
        initial_largest_bucket: 0,
        ..lexicographic(k, m)
    };

    let report = run_in_memory(config, input.path(), &dir.path().join("out.txt"));
    assert!(report.num_dumps >= 1);
    let dumped = fs::read(&dump).unwrap();
    let records = dumped.iter().filter(|&&b| b == b';').count();
    assert_eq!(records, report.largest_bucket);
}
