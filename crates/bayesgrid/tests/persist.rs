//! Integration tests for the persistence container on disk.

use bayesgrid::persist::{DeserializeError, File, NativeCodec, ObjectTag, Persist, Persisted};
use bayesgrid::testing::bimodal_histogram;
use bayesgrid::{Histogram1D, LogBase, LogNormal, Normal};

fn log_histogram() -> Histogram1D {
    let edges: Vec<f64> = (0..=30).map(|i| 10f64.powf(0.1 * i as f64)).collect();
    let mut h = Histogram1D::from_edges(&edges, Some(LogBase::TEN), 0.0).unwrap();
    h.update(&[2.0, 3.0, 30.0, 300.0, 999.0], true, false).unwrap();
    h
}

#[test]
fn histogram_roundtrips_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posterior.bgrd");

    let h = log_histogram();
    File::from_object(&h).save(&path).unwrap();

    let file = File::open(&path).unwrap();
    assert_eq!(file.tag(), ObjectTag::Histogram1D);
    assert_eq!(file.read::<Histogram1D>().unwrap(), h);
}

#[test]
fn repeated_slots_read_back_their_rows() {
    let edges: Vec<f64> = (0..=20).map(|i| -5.0 + 0.5 * i as f64).collect();
    let draws: Vec<Histogram1D> = (0..4)
        .map(|seed| bimodal_histogram(&edges, [(-2.0, 1.0), (2.0, 0.5)], 200, seed).unwrap())
        .collect();

    let mut group = draws[0].create_group(draws.len(), 0);
    for (i, h) in draws.iter().enumerate() {
        h.write_group(&mut group, i).unwrap();
    }

    let mut file = File::new();
    file.root_mut().insert_group("draws", group);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("draws.bgrd");
    file.save(&path).unwrap();

    let back = File::open(&path).unwrap();
    let group = back.root().group("draws").unwrap();
    for (i, h) in draws.iter().enumerate() {
        assert_eq!(&Histogram1D::from_group_row(group, i).unwrap(), h);
    }
}

#[test]
fn mixed_objects_dispatch_by_tag() {
    let mut file = File::new();
    file.root_mut().insert_group("h", log_histogram().to_group());
    file.root_mut().insert_group("n", Normal::new(1.0, 0.25).unwrap().to_group());
    file.root_mut()
        .insert_group("ln", LogNormal::new(100.0, 0.5, true).unwrap().to_group());

    let bytes = file.to_bytes_with(&NativeCodec::json()).unwrap();
    let back = File::from_bytes(&bytes).unwrap();
    let kinds: Vec<&str> = ["h", "ln", "n"]
        .iter()
        .map(|name| match bayesgrid::persist::read_object(back.root().group(name).unwrap()).unwrap() {
            Persisted::Histogram1D(_) => "histogram",
            Persisted::Normal(_) => "normal",
            Persisted::LogNormal(_) => "lognormal",
        })
        .collect();
    assert_eq!(kinds, vec!["histogram", "lognormal", "normal"]);
}

#[test]
fn corrupted_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.bgrd");
    File::from_object(&log_histogram()).save(&path).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(File::open(&path), Err(DeserializeError::ChecksumMismatch { .. })));
}
