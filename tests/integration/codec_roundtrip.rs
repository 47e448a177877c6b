#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use microtile::codec::{
    CellGeometry, CodecOptions, CounterMetrics, DecodeScratch, DenyListValidator, GeometryPoint,
    MicroCache,
};
use microtile::primitives::concurrency::SlotCache;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const WAY_TAGS: [&[u8]; 4] = [
    b"highway=residential",
    b"highway=track;surface=gravel",
    b"highway=cycleway",
    b"route=ferry",
];

type LinkKey = (i32, i32, bool, Option<Vec<u8>>, Vec<(i32, i32, i32)>);
type NodeKey = (i16, Option<Vec<u8>>, Vec<LinkKey>);

struct LinkSpec {
    lon: i32,
    lat: i32,
    reverse: bool,
    tags: Option<&'static [u8]>,
    geometry: Vec<GeometryPoint>,
}

struct NodeSpec {
    lon: i32,
    lat: i32,
    elevation: i16,
    tags: Option<&'static [u8]>,
    links: Vec<LinkSpec>,
}

fn random_geometry(rng: &mut ChaCha8Rng) -> Vec<GeometryPoint> {
    (0..rng.gen_range(0..4))
        .map(|_| GeometryPoint {
            dlon: rng.gen_range(-300..300),
            dlat: rng.gen_range(-300..300),
            dele: rng.gen_range(-20..20),
        })
        .collect()
}

/// Cell where every node has a tagged external link and every internal
/// forward link has its tag-less reverse on the target.
fn random_cell(seed: u64) -> (CellGeometry, MicroCache) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let cell = CellGeometry::new(rng.gen_range(0..2000), rng.gen_range(0..1000), 80).unwrap();
    let size = cell.cellsize();

    let mut by_id = BTreeMap::new();
    for _ in 0..rng.gen_range(1..60) {
        let lon = cell.lon_base() + rng.gen_range(0..size);
        let lat = cell.lat_base() + rng.gen_range(0..size);
        by_id.entry(cell.shrink_id(lon, lat)).or_insert_with(|| NodeSpec {
            lon,
            lat,
            elevation: rng.gen_range(-500..3000),
            tags: if rng.gen_bool(0.2) {
                Some(b"barrier=gate".as_slice())
            } else {
                None
            },
            links: Vec::new(),
        });
    }
    let mut nodes: Vec<NodeSpec> = by_id.into_values().collect();

    for node in nodes.iter_mut() {
        let reverse = rng.gen_bool(0.25);
        node.links.push(LinkSpec {
            lon: cell.lon_base() - 1 - rng.gen_range(0..20_000),
            lat: node.lat + rng.gen_range(-500..500),
            reverse,
            tags: Some(WAY_TAGS[rng.gen_range(0..WAY_TAGS.len())]),
            geometry: if reverse { Vec::new() } else { random_geometry(&mut rng) },
        });
    }
    if nodes.len() > 1 {
        for _ in 0..nodes.len() * 2 {
            let a = rng.gen_range(0..nodes.len());
            let b = rng.gen_range(0..nodes.len());
            if a == b {
                continue;
            }
            let (alon, alat) = (nodes[a].lon, nodes[a].lat);
            let (blon, blat) = (nodes[b].lon, nodes[b].lat);
            let geometry = random_geometry(&mut rng);
            nodes[a].links.push(LinkSpec {
                lon: blon,
                lat: blat,
                reverse: false,
                tags: Some(WAY_TAGS[rng.gen_range(0..WAY_TAGS.len())]),
                geometry,
            });
            nodes[b].links.push(LinkSpec {
                lon: alon,
                lat: alat,
                reverse: true,
                tags: None,
                geometry: Vec::new(),
            });
        }
    }

    let mut cache = MicroCache::for_encode(cell, nodes.len());
    for node in &nodes {
        let mut w = cache
            .begin_node(node.lon, node.lat, node.elevation, node.tags)
            .unwrap();
        for link in &node.links {
            w.link(link.lon, link.lat, link.reverse, link.tags, &link.geometry)
                .unwrap();
        }
        w.finish();
    }
    (cell, cache)
}

fn describe(cache: &MicroCache) -> BTreeMap<(i32, i32), NodeKey> {
    let mut out = BTreeMap::new();
    for node in cache.nodes() {
        let node = node.unwrap();
        let mut links: Vec<LinkKey> = node
            .links()
            .map(|link| {
                let link = link.unwrap();
                (
                    link.target_lon(),
                    link.target_lat(),
                    link.is_reverse(),
                    link.tags().map(<[u8]>::to_vec),
                    link.geometry()
                        .map(|p| p.map(|p| (p.dlon, p.dlat, p.dele)).unwrap())
                        .collect(),
                )
            })
            .collect();
        links.sort();
        out.insert(
            (node.lon(), node.lat()),
            (node.elevation(), node.tags().map(<[u8]>::to_vec), links),
        );
    }
    out
}

#[test]
fn random_cells_round_trip() {
    let mut scratch = DecodeScratch::new();
    for seed in 0..40 {
        let (cell, cache) = random_cell(seed);
        let mut bytes = Vec::new();
        cache.encode(&mut bytes).unwrap();
        let decoded = MicroCache::decode(&bytes, cell, &mut scratch, None, None).unwrap();
        assert_eq!(describe(&decoded), describe(&cache), "seed {seed}");
    }
}

#[test]
fn reencoding_decoded_cells_is_stable() {
    let mut scratch = DecodeScratch::new();
    for seed in 100..130 {
        let (cell, cache) = random_cell(seed);
        let mut first = Vec::new();
        cache.encode(&mut first).unwrap();
        let decoded = MicroCache::decode(&first, cell, &mut scratch, None, None).unwrap();

        let mut second = Vec::new();
        decoded.encode(&mut second).unwrap();
        assert_eq!(first, second, "seed {seed}");
        let again = MicroCache::decode(&second, cell, &mut scratch, None, None).unwrap();
        assert_eq!(again, decoded, "seed {seed}");
    }
}

#[test]
fn reencode_never_emits_internal_reverse_links() {
    let metrics = Arc::new(CounterMetrics::default());
    let options = CodecOptions::default().metrics(metrics.clone());
    let (cell, cache) = random_cell(7);
    let mut bytes = Vec::new();
    cache.encode(&mut bytes).unwrap();
    let decoded = MicroCache::decode(&bytes, cell, &mut DecodeScratch::new(), None, None).unwrap();

    let internal_reverse = decoded
        .nodes()
        .flat_map(|node| node.unwrap().links().collect::<Vec<_>>())
        .map(|link| link.unwrap())
        .filter(|link| link.is_reverse() && link.is_internal())
        .count();
    let report = decoded
        .encode_with_report(&options, &mut Vec::new())
        .unwrap();
    assert_eq!(report.skipped_reverse_links, internal_reverse);
    assert_eq!(
        metrics.reverse_links_skipped.load(Ordering::Relaxed),
        internal_reverse as u64
    );
    assert_eq!(metrics.cells_encoded.load(Ordering::Relaxed), 1);
}

#[test]
fn shared_scratch_decodes_across_threads() {
    let encoded: Vec<(CellGeometry, Vec<u8>, usize)> = (200..208)
        .map(|seed| {
            let (cell, cache) = random_cell(seed);
            let mut bytes = Vec::new();
            cache.encode(&mut bytes).unwrap();
            (cell, bytes, cache.len())
        })
        .collect();
    let encoded = Arc::new(encoded);
    let scratch = Arc::new(SlotCache::<DecodeScratch>::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let encoded = Arc::clone(&encoded);
            let scratch = Arc::clone(&scratch);
            thread::spawn(move || {
                for _ in 0..5 {
                    for (cell, bytes, len) in encoded.iter() {
                        let mut guard = scratch.checkout(DecodeScratch::new);
                        let decoded =
                            MicroCache::decode(bytes, *cell, &mut guard, None, None).unwrap();
                        assert_eq!(decoded.len(), *len);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("decode worker panicked");
    }
    assert!(scratch.is_occupied());
}

#[test]
fn node_ids_survive_in_order() {
    let (cell, cache) = random_cell(3);
    let mut bytes = Vec::new();
    cache.encode(&mut bytes).unwrap();
    let decoded = MicroCache::decode(&bytes, cell, &mut DecodeScratch::new(), None, None).unwrap();
    assert_eq!(decoded.ids(), cache.ids());
    let unique: BTreeSet<u32> = decoded.ids().iter().copied().collect();
    assert_eq!(unique.len(), decoded.len());
    for (n, id) in decoded.ids().iter().enumerate() {
        let (lon, lat) = cell.expand_id(*id);
        assert_eq!(decoded.find_node(lon, lat), Some(n));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]
    #[test]
    fn filtered_decode_is_a_fixed_point(
        seed in 0u64..10_000,
        denied in prop::sample::subsequence(WAY_TAGS.to_vec(), 0..WAY_TAGS.len()),
    ) {
        let (cell, cache) = random_cell(seed);
        let mut bytes = Vec::new();
        cache.encode(&mut bytes).expect("encode");

        let deny = DenyListValidator::new(denied.iter().map(|tags| tags.to_vec()));
        let mut scratch = DecodeScratch::new();
        let filtered = MicroCache::decode(&bytes, cell, &mut scratch, Some(&deny), None)
            .expect("filtered decode");
        for node in filtered.nodes() {
            for link in node.expect("node").links() {
                let link = link.expect("link");
                if let Some(tags) = link.tags() {
                    prop_assert!(!denied.iter().any(|d| *d == tags));
                }
            }
        }

        let mut first = Vec::new();
        filtered.encode(&mut first).expect("re-encode");
        let again = MicroCache::decode(&first, cell, &mut scratch, None, None).expect("decode");
        prop_assert_eq!(&again, &filtered);

        let mut second = Vec::new();
        again.encode(&mut second).expect("third encode");
        prop_assert_eq!(first, second);
    }
}
