//! Polygon and MultiPolygon geometry.

use crate::error::{GeodexError, Result};
use flatbuffers::{FlatBufferBuilder, WIPOffset};
use flatgeobuf::GeometryType;

/// FlatGeobuf geometry type code of a Polygon.
pub const GEOMETRY_TYPE_POLYGON: u8 = 3;

/// FlatGeobuf geometry type code of a MultiPolygon.
pub const GEOMETRY_TYPE_MULTI_POLYGON: u8 = 6;

/// A 2D coordinate `(x, y)`.
pub type Coord = (f64, f64);

/// A closed boundary.
pub type Ring = Vec<Coord>;

/// A polygon: the first ring is the outer boundary, the rest are holes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    /// Outer ring followed by holes.
    pub rings: Vec<Ring>,
}

impl Polygon {
    /// Creates a polygon from its rings.
    pub fn new(rings: Vec<Ring>) -> Self {
        Self { rings }
    }

    /// Returns the outer ring.
    pub fn exterior(&self) -> Option<&Ring> {
        self.rings.first()
    }

    /// Returns the holes.
    pub fn interiors(&self) -> &[Ring] {
        self.rings.get(1..).unwrap_or(&[])
    }

    /// Writes the polygon as a geometry table. `ends` is only written for
    /// polygons with holes.
    pub(crate) fn create<'a>(
        &self,
        fbb: &mut FlatBufferBuilder<'a>,
        type_: GeometryType,
    ) -> WIPOffset<flatgeobuf::Geometry<'a>> {
        let xy: Vec<f64> = self.rings.iter().flatten().flat_map(|&(x, y)| [x, y]).collect();
        let xy = fbb.create_vector(&xy);
        let ends = if self.rings.len() > 1 {
            let mut end = 0u32;
            let ends: Vec<u32> = self
                .rings
                .iter()
                .map(|ring| {
                    end += ring.len() as u32;
                    end
                })
                .collect();
            Some(fbb.create_vector(&ends))
        } else {
            None
        };
        flatgeobuf::Geometry::create(
            fbb,
            &flatgeobuf::GeometryArgs {
                ends,
                xy: Some(xy),
                type_,
                ..Default::default()
            },
        )
    }
}

/// Axis-aligned bounds of a geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Smallest x.
    pub min_x: f64,
    /// Smallest y.
    pub min_y: f64,
    /// Largest x.
    pub max_x: f64,
    /// Largest y.
    pub max_y: f64,
}

/// A decoded feature geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// A single polygon.
    Polygon(Polygon),
    /// A list of polygons.
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    /// Returns the FlatGeobuf geometry type code.
    pub fn type_code(&self) -> u8 {
        match self {
            Geometry::Polygon(_) => GEOMETRY_TYPE_POLYGON,
            Geometry::MultiPolygon(_) => GEOMETRY_TYPE_MULTI_POLYGON,
        }
    }

    /// Returns the polygons of this geometry.
    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Geometry::Polygon(polygon) => std::slice::from_ref(polygon),
            Geometry::MultiPolygon(polygons) => polygons,
        }
    }

    /// Returns the bounds of all coordinates, `None` if there are none.
    pub fn bbox(&self) -> Option<BoundingBox> {
        let mut coords = self
            .polygons()
            .iter()
            .flat_map(|p| p.rings.iter())
            .flatten();
        let &(x, y) = coords.next()?;
        let mut bbox = BoundingBox {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        };
        for &(x, y) in coords {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }

    pub(crate) fn create<'a>(
        &self,
        fbb: &mut FlatBufferBuilder<'a>,
    ) -> WIPOffset<flatgeobuf::Geometry<'a>> {
        match self {
            Geometry::Polygon(polygon) => polygon.create(fbb, GeometryType::Polygon),
            Geometry::MultiPolygon(polygons) => {
                let parts: Vec<_> = polygons
                    .iter()
                    .map(|p| p.create(fbb, GeometryType::Unknown))
                    .collect();
                let parts = fbb.create_vector(&parts);
                flatgeobuf::Geometry::create(
                    fbb,
                    &flatgeobuf::GeometryArgs {
                        parts: Some(parts),
                        type_: GeometryType::MultiPolygon,
                        ..Default::default()
                    },
                )
            }
        }
    }
}

/// Splits a flat `[x0, y0, x1, y1, ...]` vector into rings.
///
/// `ends` holds the exclusive end of each ring in coordinate units. Without
/// `ends` (or with an empty one) the whole vector is one ring; an empty
/// vector has no rings.
///
/// # Errors
///
/// Returns `GeodexError::Decode` for an odd-length `xy` or ends that are not
/// increasing within the coordinate count.
pub fn extract_rings(xy: &[f64], ends: Option<&[u32]>) -> Result<Vec<Ring>> {
    if xy.len() % 2 != 0 {
        return Err(GeodexError::Decode(format!(
            "xy vector has odd length {}",
            xy.len()
        )));
    }
    let coords: Vec<Coord> = xy.chunks_exact(2).map(|c| (c[0], c[1])).collect();

    let ends = match ends {
        Some(ends) if !ends.is_empty() => ends,
        _ if coords.is_empty() => return Ok(Vec::new()),
        _ => return Ok(vec![coords]),
    };

    let mut rings = Vec::with_capacity(ends.len());
    let mut start = 0usize;
    for &end in ends {
        let end = end as usize;
        if end < start || end > coords.len() {
            return Err(GeodexError::Decode(format!(
                "ring end {} outside {}..={}",
                end,
                start,
                coords.len()
            )));
        }
        rings.push(coords[start..end].to_vec());
        start = end;
    }
    Ok(rings)
}

fn decode_polygon(geometry: &flatgeobuf::Geometry<'_>) -> Result<Polygon> {
    let xy: Vec<f64> = geometry.xy().map(|v| v.iter().collect()).unwrap_or_default();
    let ends: Option<Vec<u32>> = geometry.ends().map(|v| v.iter().collect());
    Ok(Polygon::new(extract_rings(&xy, ends.as_deref())?))
}

/// Decodes a geometry table.
///
/// A geometry without its own type uses `fallback_type`, the header's
/// geometry type.
pub(crate) fn decode_geometry(
    geometry: &flatgeobuf::Geometry<'_>,
    fallback_type: u8,
) -> Result<Geometry> {
    let declared = geometry.type_().0;
    let geometry_type = if declared == 0 { fallback_type } else { declared };

    match geometry_type {
        GEOMETRY_TYPE_POLYGON => Ok(Geometry::Polygon(decode_polygon(geometry)?)),
        GEOMETRY_TYPE_MULTI_POLYGON => {
            let polygons = match geometry.parts() {
                Some(parts) => parts
                    .iter()
                    .map(|part| decode_polygon(&part))
                    .collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            };
            Ok(Geometry::MultiPolygon(polygons))
        }
        other => Err(GeodexError::UnsupportedGeometry(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finish(
        build: impl for<'a> FnOnce(&mut FlatBufferBuilder<'a>) -> WIPOffset<flatgeobuf::Geometry<'a>>,
    ) -> Vec<u8> {
        let mut fbb = FlatBufferBuilder::new();
        let root = build(&mut fbb);
        fbb.finish(root, None);
        fbb.finished_data().to_vec()
    }

    fn square(x: f64, y: f64, size: f64) -> Ring {
        vec![
            (x, y),
            (x + size, y),
            (x + size, y + size),
            (x, y + size),
            (x, y),
        ]
    }

    fn roundtrip(geometry: &Geometry) -> Geometry {
        let buf = finish(|fbb| geometry.create(fbb));
        let table = flatbuffers::root::<flatgeobuf::Geometry>(&buf).unwrap();
        decode_geometry(&table, 0).unwrap()
    }

    #[test]
    fn test_polygon_with_hole() {
        let polygon = Polygon::new(vec![square(0.0, 0.0, 10.0), square(2.0, 2.0, 3.5)]);
        let geometry = Geometry::Polygon(polygon.clone());

        let decoded = roundtrip(&geometry);
        assert_eq!(decoded, geometry);
        let Geometry::Polygon(decoded) = decoded else {
            panic!("expected polygon");
        };
        assert_eq!(decoded.exterior(), Some(&square(0.0, 0.0, 10.0)));
        assert_eq!(decoded.interiors(), &[square(2.0, 2.0, 3.5)]);
    }

    #[test]
    fn test_multi_polygon_with_two_parts() {
        let geometry = Geometry::MultiPolygon(vec![
            Polygon::new(vec![square(-9.5, 36.9, 3.0)]),
            Polygon::new(vec![square(-31.3, 38.5, 1.25), square(-31.0, 38.7, 0.5)]),
        ]);
        assert_eq!(roundtrip(&geometry), geometry);
    }

    #[test]
    fn test_missing_ends_is_single_ring() {
        let xy = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0];
        let rings = extract_rings(&xy, None).unwrap();
        assert_eq!(rings, vec![vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]]);
        assert_eq!(extract_rings(&xy, Some(&[])).unwrap(), rings);
        assert!(extract_rings(&[], None).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_ends_and_odd_xy() {
        let xy = [0.0, 0.0, 1.0, 1.0];
        assert!(extract_rings(&xy, Some(&[3])).is_err());
        assert!(extract_rings(&xy, Some(&[2, 1])).is_err());
        assert!(extract_rings(&[0.0, 1.0, 2.0], None).is_err());
    }

    #[test]
    fn test_header_type_fallback_and_unsupported_type() {
        let polygon = Polygon::new(vec![square(0.0, 0.0, 1.0)]);
        let buf = finish(|fbb| polygon.create(fbb, GeometryType::Unknown));
        let table = flatbuffers::root::<flatgeobuf::Geometry>(&buf).unwrap();
        assert_eq!(table.type_(), GeometryType::Unknown);

        assert_eq!(
            decode_geometry(&table, GEOMETRY_TYPE_POLYGON).unwrap(),
            Geometry::Polygon(polygon)
        );
        assert!(matches!(
            decode_geometry(&table, 2),
            Err(GeodexError::UnsupportedGeometry(2))
        ));
    }

    #[test]
    fn test_bbox() {
        let geometry = Geometry::MultiPolygon(vec![
            Polygon::new(vec![square(0.0, 0.0, 1.0)]),
            Polygon::new(vec![square(-5.0, 3.0, 2.0)]),
        ]);
        let bbox = geometry.bbox().unwrap();
        assert_eq!(bbox.min_x, -5.0);
        assert_eq!(bbox.min_y, 0.0);
        assert_eq!(bbox.max_x, 1.0);
        assert_eq!(bbox.max_y, 5.0);
        assert!(Geometry::MultiPolygon(vec![]).bbox().is_none());
    }
}
