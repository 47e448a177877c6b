#![allow(missing_docs)]

use std::sync::atomic::Ordering;
use std::sync::Arc;

use microtile::codec::{
    CellGeometry, CodecOptions, CounterMetrics, DecodeScratch, DenyListValidator, GeometryPoint,
    MicroCache, PolylineRecorder,
};
use microtile::primitives::frame;
use microtile::TileError;

fn cell() -> CellGeometry {
    CellGeometry::new(1085, 3850, 80).expect("cell")
}

fn encode(cache: &MicroCache) -> Vec<u8> {
    let mut bytes = Vec::new();
    cache.encode(&mut bytes).expect("encode");
    bytes
}

fn decode(bytes: &[u8]) -> MicroCache {
    MicroCache::decode(bytes, cell(), &mut DecodeScratch::new(), None, None).expect("decode")
}

#[test]
fn two_node_track_gains_reverse_link() {
    let c = cell();
    let (alon, alat) = (c.lon_base() + 10, c.lat_base() + 10);
    let (blon, blat) = (c.lon_base() + 50, c.lat_base() + 20);
    let mut cache = MicroCache::for_encode(c, 2);
    let mut a = cache.begin_node(alon, alat, 0, None).unwrap();
    a.link(blon, blat, false, Some(b"highway=track".as_slice()), &[])
        .unwrap();
    a.finish();
    cache.begin_node(blon, blat, 0, None).unwrap().finish();

    let decoded = decode(&encode(&cache));
    assert_eq!(decoded.len(), 2);

    let a = decoded.node(0).unwrap();
    let links: Vec<_> = a.links().map(Result::unwrap).collect();
    assert_eq!(links.len(), 1);
    assert!(!links[0].is_reverse());
    assert!(links[0].is_internal());
    assert_eq!((links[0].target_lon(), links[0].target_lat()), (blon, blat));
    assert_eq!(links[0].tags(), Some(b"highway=track".as_slice()));
    assert_eq!(links[0].geometry().count(), 0);

    let b = decoded.node(1).unwrap();
    let links: Vec<_> = b.links().map(Result::unwrap).collect();
    assert_eq!(links.len(), 1);
    assert!(links[0].is_reverse());
    assert_eq!((links[0].target_lon(), links[0].target_lat()), (alon, alat));
    assert_eq!(
        links[0].target_lon() - b.lon(),
        -(blon - alon),
        "reverse delta is the negated forward delta"
    );
    assert_eq!(links[0].tags(), None);
}

#[test]
fn single_node_with_null_tagged_link_decodes_empty() {
    let c = cell();
    let (lon, lat) = (c.lon_base() + 7, c.lat_base() + 9);
    let mut cache = MicroCache::for_encode(c, 1);
    let mut a = cache.begin_node(lon, lat, 12, None).unwrap();
    a.link(lon - 50_000, lat, false, None, &[]).unwrap();
    a.finish();

    let decoded = decode(&encode(&cache));
    assert!(decoded.is_empty());
    assert!(decoded.data().is_empty());
}

#[test]
fn external_reverse_links_are_preserved() {
    let c = cell();
    let (alon, alat) = (c.lon_base() + 10, c.lat_base() + 10);
    let (blon, blat) = (c.lon_base() + 900, c.lat_base() + 40);
    let mut cache = MicroCache::for_encode(c, 2);
    let mut a = cache.begin_node(alon, alat, 0, None).unwrap();
    a.link(alon - 30_000, alat + 5, true, Some(b"highway=primary".as_slice()), &[])
        .unwrap();
    a.link(
        blon,
        blat,
        false,
        Some(b"highway=primary".as_slice()),
        &[GeometryPoint { dlon: 400, dlat: 10, dele: 0 }],
    )
    .unwrap();
    a.finish();
    cache.begin_node(blon, blat, 0, None).unwrap().finish();

    let bytes = encode(&cache);
    let mut recorder = PolylineRecorder::new();
    let decoded =
        MicroCache::decode(&bytes, c, &mut DecodeScratch::new(), None, Some(&mut recorder))
            .unwrap();

    let a = decoded.node(0).unwrap();
    let external: Vec<_> = a
        .links()
        .map(Result::unwrap)
        .filter(|link| !link.is_internal())
        .collect();
    assert_eq!(external.len(), 1);
    assert!(external[0].is_reverse());
    assert_eq!(external[0].target_lon(), alon - 30_000);
    assert_eq!(external[0].geometry().count(), 0);
    assert_eq!(recorder.polylines().len(), 1, "reverse links feed no geometry");

    let report = decoded
        .encode_with_report(&CodecOptions::default(), &mut Vec::new())
        .unwrap();
    assert_eq!(report.skipped_reverse_links, 1);
    assert_eq!(report.links, 2);

    let again = decode(&encode(&decoded));
    assert_eq!(again, decoded);
}

#[test]
fn nodes_without_valid_links_are_dropped() {
    let c = cell();
    let (alon, alat) = (c.lon_base() + 5, c.lat_base() + 5);
    let (blon, blat) = (c.lon_base() + 100, c.lat_base() + 5);
    let (clon, clat) = (c.lon_base() + 5, c.lat_base() + 200);
    let mut cache = MicroCache::for_encode(c, 3);
    let mut a = cache.begin_node(alon, alat, 0, None).unwrap();
    a.link(blon, blat, false, Some(b"highway=motorway".as_slice()), &[])
        .unwrap();
    a.link(alon - 20_000, alat, false, Some(b"highway=path".as_slice()), &[])
        .unwrap();
    a.finish();
    cache.begin_node(blon, blat, 0, None).unwrap().finish();
    let mut cn = cache.begin_node(clon, clat, 0, None).unwrap();
    cn.link(clon, clat - 20_000, false, Some(b"highway=motorway".as_slice()), &[])
        .unwrap();
    cn.finish();

    let metrics = Arc::new(CounterMetrics::default());
    let options = CodecOptions::default().metrics(metrics.clone());
    let deny = DenyListValidator::new([b"highway=motorway".to_vec()]);
    let decoded = MicroCache::decode_with(
        &options,
        &encode(&cache),
        c,
        &mut DecodeScratch::new(),
        Some(&deny),
        None,
    )
    .unwrap();

    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded.find_node(alon, alat), Some(0));
    let links: Vec<_> = decoded.node(0).unwrap().links().map(Result::unwrap).collect();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].tags(), Some(b"highway=path".as_slice()));
    assert_eq!(metrics.links_filtered.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.invalid_nodes_dropped.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.reverse_links_synthesized.load(Ordering::Relaxed), 0);
}

#[test]
fn validator_can_rewrite_tags() {
    let c = cell();
    let (lon, lat) = (c.lon_base() + 3, c.lat_base() + 3);
    let mut cache = MicroCache::for_encode(c, 1);
    let mut a = cache.begin_node(lon, lat, 0, None).unwrap();
    a.link(lon, lat + 40_000, false, Some(b"highway=track".as_slice()), &[])
        .unwrap();
    a.finish();

    let rewrite = |tags: &[u8]| -> Option<Vec<u8>> {
        let mut out = tags.to_vec();
        out.extend_from_slice(b";access=private");
        Some(out)
    };
    let decoded = MicroCache::decode(
        &encode(&cache),
        c,
        &mut DecodeScratch::new(),
        Some(&rewrite),
        None,
    )
    .unwrap();
    let link = decoded.node(0).unwrap().links().next().unwrap().unwrap();
    assert_eq!(link.tags(), Some(b"highway=track;access=private".as_slice()));
}

#[test]
fn matcher_sees_predicted_geometry_points() {
    let c = cell();
    let (alon, alat) = (c.lon_base() + 100, c.lat_base() + 100);
    let (blon, blat) = (alon + 50, alat + 2);
    let geometry = [
        GeometryPoint { dlon: 10, dlat: 3, dele: 1 },
        GeometryPoint { dlon: 20, dlat: -4, dele: 2 },
        GeometryPoint { dlon: 5, dlat: 0, dele: -1 },
    ];
    let mut cache = MicroCache::for_encode(c, 2);
    let mut a = cache.begin_node(alon, alat, 0, None).unwrap();
    a.link(blon, blat, false, Some(b"highway=service".as_slice()), &geometry)
        .unwrap();
    a.finish();
    cache.begin_node(blon, blat, 0, None).unwrap().finish();

    let mut recorder = PolylineRecorder::new();
    let decoded = MicroCache::decode(
        &encode(&cache),
        c,
        &mut DecodeScratch::new(),
        None,
        Some(&mut recorder),
    )
    .unwrap();

    let lines = recorder.take();
    assert_eq!(lines.len(), 1);
    assert_eq!(
        lines[0].as_slice(),
        &[
            (alon, alat),
            (alon + 10, alat + 3),
            (alon + 30, alat - 1),
            (alon + 35, alat - 1),
            (blon, blat),
        ]
    );
    let link = decoded.node(0).unwrap().links().next().unwrap().unwrap();
    let points: Vec<_> = link.geometry().map(Result::unwrap).collect();
    assert_eq!(points, geometry);
}

#[test]
fn sealed_tiles_detect_damage() {
    let c = cell();
    let (lon, lat) = (c.lon_base(), c.lat_base());
    let mut cache = MicroCache::for_encode(c, 1);
    let mut a = cache.begin_node(lon, lat, 5, Some(b"railway=crossing".as_slice())).unwrap();
    a.link(lon - 1, lat, false, Some(b"highway=footway".as_slice()), &[])
        .unwrap();
    a.finish();

    let mut sealed = frame::seal(&encode(&cache));
    let decoded = decode(frame::open(&sealed).unwrap());
    assert_eq!(decoded, cache);

    sealed[0] ^= 0x01;
    assert!(matches!(frame::open(&sealed), Err(TileError::Checksum { .. })));
}

#[test]
fn declared_link_data_above_limit_is_corruption() {
    let c = cell();
    let (lon, lat) = (c.lon_base() + 1, c.lat_base() + 1);
    let mut cache = MicroCache::for_encode(c, 1);
    let mut a = cache.begin_node(lon, lat, 0, None).unwrap();
    a.link(lon, lat - 2, false, Some(b"highway=steps".as_slice()), &[])
        .unwrap();
    a.finish();

    let metrics = Arc::new(CounterMetrics::default());
    let options = CodecOptions::default()
        .metrics(metrics.clone())
        .max_link_data_bytes(4);
    let err = MicroCache::decode_with(
        &options,
        &encode(&cache),
        c,
        &mut DecodeScratch::new(),
        None,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, TileError::Corruption(_)));
    assert_eq!(metrics.decode_failures.load(Ordering::Relaxed), 1);
}
