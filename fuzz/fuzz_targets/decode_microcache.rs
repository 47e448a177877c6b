#![no_main]

use libfuzzer_sys::fuzz_target;
use microtile::codec::{CellGeometry, DecodeScratch, MicroCache, PolylineRecorder};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let divisor = 31 + i32::from(data[0] % 64);
    let Ok(cell) = CellGeometry::new(i32::from(data[1]), 1000, divisor) else {
        return;
    };
    let payload = &data[2..];

    let mut scratch = DecodeScratch::new();
    let mut recorder = PolylineRecorder::new();
    let Ok(cache) = MicroCache::decode(payload, cell, &mut scratch, None, Some(&mut recorder))
    else {
        return;
    };

    // anything that decodes must walk cleanly
    for node in cache.nodes() {
        let node = node.expect("decoded node record");
        for link in node.links() {
            let link = link.expect("decoded link record");
            for point in link.geometry() {
                point.expect("decoded geometry point");
            }
        }
    }
    let mut bytes = Vec::new();
    if cache.encode(&mut bytes).is_ok() {
        let _ = MicroCache::decode(&bytes, cell, &mut scratch, None, None);
    }
});
