//! Planar polygon triangulation: Newell normal, projection, hole bridging
//! and ear clipping.

use nalgebra::{Vector2, Vector3};

const EPS: f64 = 1e-12;

/// Result of triangulating one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangulation {
    /// Index triples into the input points (outer loop first, then holes
    /// in order), wound counter-clockwise about `normal`.
    pub triangles: Vec<[usize; 3]>,
    /// Unit normal of the outer loop.
    pub normal: Vector3<f64>,
    /// Holes that could not be bridged and were left out.
    pub dropped_holes: usize,
}

/// Newell's normal of a closed loop (not normalised).
pub fn newell_normal(points: &[Vector3<f64>]) -> Vector3<f64> {
    let mut n = Vector3::zeros();
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    n
}

/// Triangulate an outer loop with optional holes.
///
/// Returns `None` when the outer loop is degenerate (fewer than three
/// distinct points or zero area).
pub fn triangulate(outer: &[Vector3<f64>], holes: &[Vec<Vector3<f64>>]) -> Option<Triangulation> {
    if outer.len() < 3 {
        return None;
    }
    let normal = newell_normal(outer).try_normalize(EPS)?;
    let (u, v) = plane_basis(&normal);
    let project = |p: &Vector3<f64>| Vector2::new(p.dot(&u), p.dot(&v));

    let mut points: Vec<Vector2<f64>> = outer.iter().map(project).collect();
    let mut ring: Vec<usize> = (0..outer.len()).collect();
    if signed_area(&points, &ring) < 0.0 {
        ring.reverse();
    }

    // Holes, rightmost first, each wound clockwise.
    let mut hole_rings = Vec::new();
    for hole in holes.iter().filter(|h| h.len() >= 3) {
        let start = points.len();
        points.extend(hole.iter().map(project));
        let mut indices: Vec<usize> = (start..points.len()).collect();
        if signed_area(&points, &indices) > 0.0 {
            indices.reverse();
        }
        hole_rings.push(indices);
    }
    hole_rings.sort_by(|a, b| max_x(&points, b).total_cmp(&max_x(&points, a)));

    let mut dropped_holes = holes.iter().filter(|h| h.len() < 3).count();
    for hole in hole_rings {
        match bridge(&points, &ring, &hole) {
            Some(merged) => ring = merged,
            None => dropped_holes += 1,
        }
    }

    Some(Triangulation {
        triangles: ear_clip(&points, ring),
        normal,
        dropped_holes,
    })
}

/// Orthonormal `u`, `v` with `u x v = normal`.
fn plane_basis(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let helper = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = helper.cross(normal).normalize();
    let v = normal.cross(&u);
    (u, v)
}

fn signed_area(points: &[Vector2<f64>], ring: &[usize]) -> f64 {
    let mut area = 0.0;
    for (i, &a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        area += points[a].x * points[b].y - points[b].x * points[a].y;
    }
    area * 0.5
}

fn max_x(points: &[Vector2<f64>], ring: &[usize]) -> f64 {
    ring.iter()
        .map(|&i| points[i].x)
        .fold(f64::NEG_INFINITY, f64::max)
}

fn cross(o: Vector2<f64>, a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Whether `p` lies inside or on triangle `abc` (counter-clockwise).
fn in_triangle(p: Vector2<f64>, a: Vector2<f64>, b: Vector2<f64>, c: Vector2<f64>) -> bool {
    cross(a, b, p) >= -EPS && cross(b, c, p) >= -EPS && cross(c, a, p) >= -EPS
}

/// Splice `hole` into `ring` through a mutually visible vertex pair.
fn bridge(points: &[Vector2<f64>], ring: &[usize], hole: &[usize]) -> Option<Vec<usize>> {
    let (hole_pos, &m_index) = hole
        .iter()
        .enumerate()
        .max_by(|a, b| points[*a.1].x.total_cmp(&points[*b.1].x))?;
    let m = points[m_index];

    // Closest edge hit by the ray from M towards +x.
    let mut best: Option<(f64, usize)> = None;
    for i in 0..ring.len() {
        let a = points[ring[i]];
        let b = points[ring[(i + 1) % ring.len()]];
        if (a.y > m.y) == (b.y > m.y) {
            continue;
        }
        let t = (m.y - a.y) / (b.y - a.y);
        let x = a.x + t * (b.x - a.x);
        if x >= m.x && best.map_or(true, |(bx, _)| x < bx) {
            let pick = if a.x > b.x { i } else { (i + 1) % ring.len() };
            best = Some((x, pick));
        }
    }
    let (hit_x, mut pick) = best?;

    // A reflex vertex inside the triangle (M, hit, P) would block the
    // bridge; take the one closest in angle to the ray instead.
    let hit = Vector2::new(hit_x, m.y);
    let p = points[ring[pick]];
    let mut best_angle = f64::INFINITY;
    for (i, &idx) in ring.iter().enumerate() {
        let q = points[idx];
        if i == pick || q.x < m.x {
            continue;
        }
        let inside = if p.y < m.y {
            in_triangle(q, m, p, hit)
        } else {
            in_triangle(q, m, hit, p)
        };
        if !inside || !is_reflex(points, ring, i) {
            continue;
        }
        let d = q - m;
        let angle = d.y.abs().atan2(d.x);
        if angle < best_angle {
            best_angle = angle;
            pick = i;
        }
    }

    let mut merged = Vec::with_capacity(ring.len() + hole.len() + 2);
    merged.extend_from_slice(&ring[..=pick]);
    merged.extend(hole[hole_pos..].iter().chain(&hole[..hole_pos]));
    merged.push(m_index);
    merged.extend_from_slice(&ring[pick..]);
    Some(merged)
}

fn is_reflex(points: &[Vector2<f64>], ring: &[usize], i: usize) -> bool {
    let n = ring.len();
    let prev = points[ring[(i + n - 1) % n]];
    let cur = points[ring[i]];
    let next = points[ring[(i + 1) % n]];
    cross(prev, cur, next) <= 0.0
}

/// Clip ears from a counter-clockwise ring.
fn ear_clip(points: &[Vector2<f64>], mut ring: Vec<usize>) -> Vec<[usize; 3]> {
    let mut triangles = Vec::with_capacity(ring.len().saturating_sub(2));
    let mut i = 0;
    let mut since_last_ear = 0;

    while ring.len() > 3 {
        let n = ring.len();
        let (ia, ib, ic) = (ring[(i + n - 1) % n], ring[i % n], ring[(i + 1) % n]);
        let (a, b, c) = (points[ia], points[ib], points[ic]);
        let turn = cross(a, b, c);

        let is_ear = turn > EPS
            && !ring.iter().any(|&other| {
                let q = points[other];
                other != ia
                    && other != ib
                    && other != ic
                    && q != a
                    && q != b
                    && q != c
                    && in_triangle(q, a, b, c)
            });

        if is_ear || (turn.abs() <= EPS && since_last_ear >= n) {
            if is_ear {
                triangles.push([ia, ib, ic]);
            }
            ring.remove(i % n);
            since_last_ear = 0;
            i %= ring.len();
            continue;
        }

        since_last_ear += 1;
        if since_last_ear > 2 * n {
            // No ear left (self-intersecting input): fan what remains.
            for k in 1..ring.len() - 1 {
                triangles.push([ring[0], ring[k], ring[k + 1]]);
            }
            return triangles;
        }
        i = (i + 1) % n;
    }
    if ring.len() == 3 && cross(points[ring[0]], points[ring[1]], points[ring[2]]).abs() > EPS {
        triangles.push([ring[0], ring[1], ring[2]]);
    }
    triangles
}
