use crate::types::{Result, TileError};

/// Coordinate units per degree-scaled grid step; `cellsize = SCALE / divisor`.
pub const COORDINATE_SCALE: i32 = 1_000_000;

/// Bits of offset kept per axis in a compact id.
pub const OFFSET_BITS: u32 = 15;

/// Highest bit that can be set in a compact id, used as the sorted-array
/// start bit.
pub const ID_TOP_BIT: u32 = 1 << (2 * OFFSET_BITS - 1);

/// Origin and extent of one grid cell.
///
/// Compact ids interleave the low 15 bits of the longitude and latitude
/// offsets from the origin (longitude bit `i` at id bit `2i`, latitude bit
/// `i` at `2i + 1`), so ascending ids follow a Z-order curve.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CellGeometry {
    lon_base: i32,
    lat_base: i32,
    cellsize: i32,
    divisor: i32,
}

impl CellGeometry {
    /// Cell `(lon_idx, lat_idx)` of the grid with `divisor` cells per unit.
    pub fn new(lon_idx: i32, lat_idx: i32, divisor: i32) -> Result<Self> {
        if divisor <= 0 {
            return Err(TileError::Invalid("divisor must be positive"));
        }
        let cellsize = COORDINATE_SCALE / divisor;
        if cellsize == 0 {
            return Err(TileError::Invalid("divisor exceeds coordinate scale"));
        }
        if cellsize > 1 << OFFSET_BITS {
            return Err(TileError::Invalid("cell larger than the compact id range"));
        }
        let lon_base = lon_idx
            .checked_mul(cellsize)
            .ok_or(TileError::Invalid("longitude cell index out of range"))?;
        let lat_base = lat_idx
            .checked_mul(cellsize)
            .ok_or(TileError::Invalid("latitude cell index out of range"))?;
        Ok(Self {
            lon_base,
            lat_base,
            cellsize,
            divisor,
        })
    }

    /// Cell containing the absolute coordinate `(lon, lat)`.
    pub fn containing(lon: i32, lat: i32, divisor: i32) -> Result<Self> {
        if divisor <= 0 {
            return Err(TileError::Invalid("divisor must be positive"));
        }
        let cellsize = (COORDINATE_SCALE / divisor).max(1);
        Self::new(lon.div_euclid(cellsize), lat.div_euclid(cellsize), divisor)
    }

    /// Longitude of the cell origin.
    pub fn lon_base(&self) -> i32 {
        self.lon_base
    }

    /// Latitude of the cell origin.
    pub fn lat_base(&self) -> i32 {
        self.lat_base
    }

    /// Edge length of the cell in coordinate units.
    pub fn cellsize(&self) -> i32 {
        self.cellsize
    }

    /// Grid index of the cell along the longitude axis.
    pub fn lon_idx(&self) -> i32 {
        self.lon_base / self.cellsize
    }

    /// Grid index of the cell along the latitude axis.
    pub fn lat_idx(&self) -> i32 {
        self.lat_base / self.cellsize
    }

    /// Grid divisor this cell was built with.
    pub fn divisor(&self) -> i32 {
        self.divisor
    }

    /// Whether `(lon, lat)` lies inside `[base, base + cellsize)` on both axes.
    pub fn is_internal(&self, lon: i32, lat: i32) -> bool {
        let dlon = i64::from(lon) - i64::from(self.lon_base);
        let dlat = i64::from(lat) - i64::from(self.lat_base);
        let size = i64::from(self.cellsize);
        (0..size).contains(&dlon) && (0..size).contains(&dlat)
    }

    /// Absolute coordinate of compact id `id`.
    pub fn expand_id(&self, id: u32) -> (i32, i32) {
        let dlon = compact_even_bits(id);
        let dlat = compact_even_bits(id >> 1);
        (
            self.lon_base.wrapping_add(dlon as i32),
            self.lat_base.wrapping_add(dlat as i32),
        )
    }

    /// Compact id of `(lon, lat)`; only the low 15 offset bits per axis are kept.
    pub fn shrink_id(&self, lon: i32, lat: i32) -> u32 {
        let dlon = lon.wrapping_sub(self.lon_base) as u32;
        let dlat = lat.wrapping_sub(self.lat_base) as u32;
        spread_even_bits(dlon) | (spread_even_bits(dlat) << 1)
    }
}

/// Spreads the low 15 bits of `x` into the even bit positions.
fn spread_even_bits(x: u32) -> u32 {
    let mut x = x & 0x0000_7FFF;
    x = (x | (x << 8)) & 0x00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333;
    x = (x | (x << 1)) & 0x5555_5555;
    x
}

/// Gathers the even bit positions of `x` into its low 15 bits.
fn compact_even_bits(x: u32) -> u32 {
    let mut x = x & 0x1555_5555;
    x = (x | (x >> 1)) & 0x3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF;
    x & 0x7FFF
}
