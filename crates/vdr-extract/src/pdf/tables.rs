//! Ruled-table detection over lopdf content streams
//!
//! Painted path segments that run along an axis become edges. Edges are
//! snapped onto shared positions, joined where collinear and intersected.
//! A cell is the smallest rectangle whose corners are intersections linked by
//! edges, and cells sharing a corner form one table. Text runs are placed
//! into cells by their starting point.
//!
//! Coordinates are user space with y negated, so `top` grows down the page.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use lopdf::content::Operation;
use lopdf::{Document, Encoding, Object, ObjectId};

use super::RawTable;

const SNAP_TOLERANCE: f64 = 3.0;
const JOIN_TOLERANCE: f64 = 3.0;
const INTERSECTION_TOLERANCE: f64 = 3.0;
const EDGE_MIN_LENGTH: f64 = 3.0;
/// Segments skewed by less than this still count as axis-aligned
const AXIS_TOLERANCE: f64 = 0.5;

/// Detect ruled tables on a page, top-left table first
pub(crate) fn find_tables(doc: &Document, page_id: ObjectId) -> lopdf::Result<Vec<RawTable>> {
    let encodings: BTreeMap<Vec<u8>, Encoding> = doc
        .get_page_fonts(page_id)?
        .into_iter()
        .filter_map(|(name, font)| font.get_font_encoding(doc).ok().map(|e| (name, e)))
        .collect();
    let content = doc.get_and_decode_page_content(page_id)?;

    let mut scanner = PageScanner::new(&encodings);
    for operation in &content.operations {
        scanner.apply(operation);
    }

    let edges = merge_edges(scanner.edges);
    if edges.is_empty() {
        return Ok(Vec::new());
    }

    let points = intersections(&edges);
    let tables = group_cells(intersections_to_cells(&points));
    tracing::debug!(
        "Page {:?}: {} edges, {} intersections, {} tables",
        page_id,
        edges.len(),
        points.len(),
        tables.len()
    );

    Ok(tables
        .iter()
        .map(|cells| table_rows(cells, &scanner.runs))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Vertical,
}

/// An axis-aligned edge; `pos` is the fixed coordinate, `start..end` the span
#[derive(Debug, Clone, Copy)]
struct Edge {
    orientation: Orientation,
    pos: f64,
    start: f64,
    end: f64,
}

impl Edge {
    fn from_segment(from: (f64, f64), to: (f64, f64)) -> Option<Self> {
        let (x1, top1) = (from.0, -from.1);
        let (x2, top2) = (to.0, -to.1);
        if (top1 - top2).abs() <= AXIS_TOLERANCE {
            Some(Self {
                orientation: Orientation::Horizontal,
                pos: (top1 + top2) / 2.0,
                start: x1.min(x2),
                end: x1.max(x2),
            })
        } else if (x1 - x2).abs() <= AXIS_TOLERANCE {
            Some(Self {
                orientation: Orientation::Vertical,
                pos: (x1 + x2) / 2.0,
                start: top1.min(top2),
                end: top1.max(top2),
            })
        } else {
            None
        }
    }

    fn length(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone)]
struct TextRun {
    x: f64,
    top: f64,
    text: String,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    x0: f64,
    top: f64,
    x1: f64,
    bottom: f64,
}

impl Cell {
    fn corners(&self) -> [PointKey; 4] {
        [
            (key(self.x0), key(self.top)),
            (key(self.x1), key(self.top)),
            (key(self.x0), key(self.bottom)),
            (key(self.x1), key(self.bottom)),
        ]
    }

    fn contains(&self, x: f64, top: f64) -> bool {
        x >= self.x0 && x <= self.x1 && top >= self.top && top <= self.bottom
    }
}

/// Row-major affine matrix `[a b c d e f]`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f64, ty: f64) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self` applied first, then `other`
    fn then(self, other: Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [oa, ob, oc, od, oe, of] = other.0;
        Matrix([
            a * oa + b * oc,
            a * ob + b * od,
            c * oa + d * oc,
            c * ob + d * od,
            e * oa + f * oc + oe,
            e * ob + f * od + of,
        ])
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }
}

/// Walks content operations, collecting painted edges and positioned text
struct PageScanner<'a> {
    encodings: &'a BTreeMap<Vec<u8>, Encoding<'a>>,
    ctm: Matrix,
    saved: Vec<Matrix>,
    current: Option<(f64, f64)>,
    subpath_start: Option<(f64, f64)>,
    segments: Vec<((f64, f64), (f64, f64))>,
    edges: Vec<Edge>,
    tm: Matrix,
    tlm: Matrix,
    leading: f64,
    font: Option<Vec<u8>>,
    runs: Vec<TextRun>,
}

impl<'a> PageScanner<'a> {
    fn new(encodings: &'a BTreeMap<Vec<u8>, Encoding<'a>>) -> Self {
        Self {
            encodings,
            ctm: Matrix::IDENTITY,
            saved: Vec::new(),
            current: None,
            subpath_start: None,
            segments: Vec::new(),
            edges: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            leading: 0.0,
            font: None,
            runs: Vec::new(),
        }
    }

    fn apply(&mut self, op: &Operation) {
        let operands = op.operands.as_slice();
        let n = |i: usize| number(operands, i);

        match op.operator.as_str() {
            "q" => self.saved.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.saved.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = matrix(operands) {
                    self.ctm = m.then(self.ctm);
                }
            }

            // path construction
            "m" => {
                if let (Some(x), Some(y)) = (n(0), n(1)) {
                    let point = self.ctm.apply(x, y);
                    self.current = Some(point);
                    self.subpath_start = Some(point);
                }
            }
            "l" => {
                if let (Some(x), Some(y)) = (n(0), n(1)) {
                    self.line_to(self.ctm.apply(x, y));
                }
            }
            "c" => {
                if let (Some(x), Some(y)) = (n(4), n(5)) {
                    self.current = Some(self.ctm.apply(x, y));
                }
            }
            "v" | "y" => {
                if let (Some(x), Some(y)) = (n(2), n(3)) {
                    self.current = Some(self.ctm.apply(x, y));
                }
            }
            "re" => {
                if let (Some(x), Some(y), Some(w), Some(h)) = (n(0), n(1), n(2), n(3)) {
                    let origin = self.ctm.apply(x, y);
                    self.current = Some(origin);
                    self.subpath_start = Some(origin);
                    self.line_to(self.ctm.apply(x + w, y));
                    self.line_to(self.ctm.apply(x + w, y + h));
                    self.line_to(self.ctm.apply(x, y + h));
                    self.close_subpath();
                }
            }
            "h" => self.close_subpath(),

            // path painting
            "s" | "b" | "b*" => {
                self.close_subpath();
                self.paint();
            }
            "S" | "f" | "F" | "f*" | "B" | "B*" => self.paint(),
            "n" => {
                self.segments.clear();
                self.current = None;
            }

            // text
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                self.font = operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .map(<[u8]>::to_vec);
            }
            "TL" => {
                if let Some(leading) = n(0) {
                    self.leading = leading;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (n(0), n(1)) {
                    self.move_text(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (n(0), n(1)) {
                    self.leading = -ty;
                    self.move_text(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = matrix(operands) {
                    self.tm = m;
                    self.tlm = m;
                }
            }
            "T*" => self.move_text(0.0, -self.leading),
            "Tj" | "TJ" => self.show(operands),
            "'" => {
                self.move_text(0.0, -self.leading);
                self.show(operands);
            }
            "\"" => {
                self.move_text(0.0, -self.leading);
                self.show(operands.get(2..).unwrap_or_default());
            }
            _ => {}
        }
    }

    fn line_to(&mut self, point: (f64, f64)) {
        if let Some(from) = self.current {
            self.segments.push((from, point));
        }
        self.current = Some(point);
    }

    fn close_subpath(&mut self) {
        if let (Some(current), Some(start)) = (self.current, self.subpath_start) {
            if current != start {
                self.segments.push((current, start));
            }
            self.current = Some(start);
        }
    }

    fn paint(&mut self) {
        self.edges.extend(
            self.segments
                .drain(..)
                .filter_map(|(from, to)| Edge::from_segment(from, to)),
        );
        self.current = None;
    }

    fn move_text(&mut self, tx: f64, ty: f64) {
        self.tlm = Matrix::translate(tx, ty).then(self.tlm);
        self.tm = self.tlm;
    }

    fn show(&mut self, operands: &[Object]) {
        let encodings = self.encodings;
        let Some(encoding) = self.font.as_ref().and_then(|font| encodings.get(font)) else {
            return;
        };

        let mut text = String::new();
        collect_strings(&mut text, encoding, operands);
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let (x, y) = self.tm.then(self.ctm).apply(0.0, 0.0);
        self.runs.push(TextRun {
            x,
            top: -y,
            text: text.to_string(),
        });
    }
}

fn collect_strings(out: &mut String, encoding: &Encoding, operands: &[Object]) {
    for operand in operands {
        match operand {
            Object::String(bytes, _) => {
                if let Ok(decoded) = Document::decode_text(encoding, bytes) {
                    out.push_str(&decoded);
                }
            }
            Object::Array(items) => collect_strings(out, encoding, items),
            // large negative kerning separates words
            Object::Integer(i) if *i < -100 => out.push(' '),
            Object::Real(r) if *r < -100.0 => out.push(' '),
            _ => {}
        }
    }
}

fn number(operands: &[Object], index: usize) -> Option<f64> {
    operands
        .get(index)
        .and_then(|o| o.as_float().ok())
        .map(f64::from)
}

fn matrix(operands: &[Object]) -> Option<Matrix> {
    let mut m = [0.0; 6];
    for (i, slot) in m.iter_mut().enumerate() {
        *slot = number(operands, i)?;
    }
    Some(Matrix(m))
}

/// Snap, join and length-filter edges
fn merge_edges(edges: Vec<Edge>) -> Vec<Edge> {
    let (mut horizontal, mut vertical): (Vec<Edge>, Vec<Edge>) = edges
        .into_iter()
        .partition(|e| e.orientation == Orientation::Horizontal);
    snap_edges(&mut horizontal);
    snap_edges(&mut vertical);

    let mut merged = join_edges(horizontal);
    merged.extend(join_edges(vertical));
    merged.retain(|e| e.length() >= EDGE_MIN_LENGTH);
    merged
}

/// Move edges whose positions chain within tolerance onto their average
fn snap_edges(edges: &mut [Edge]) {
    edges.sort_by(|a, b| a.pos.total_cmp(&b.pos));
    let mut i = 0;
    while i < edges.len() {
        let mut j = i + 1;
        while j < edges.len() && edges[j].pos - edges[j - 1].pos <= SNAP_TOLERANCE {
            j += 1;
        }
        let avg = edges[i..j].iter().map(|e| e.pos).sum::<f64>() / (j - i) as f64;
        for edge in &mut edges[i..j] {
            edge.pos = avg;
        }
        i = j;
    }
}

/// Join edges at the same position whose spans overlap or nearly touch
fn join_edges(mut edges: Vec<Edge>) -> Vec<Edge> {
    edges.sort_by(|a, b| a.pos.total_cmp(&b.pos).then(a.start.total_cmp(&b.start)));
    let mut joined: Vec<Edge> = Vec::with_capacity(edges.len());
    for edge in edges {
        match joined.last_mut() {
            Some(last) if key(last.pos) == key(edge.pos) && edge.start <= last.end + JOIN_TOLERANCE => {
                last.end = last.end.max(edge.end);
            }
            _ => joined.push(edge),
        }
    }
    joined
}

/// Point key in thousandths of a unit, ordered by x then top
type PointKey = (i64, i64);

fn key(value: f64) -> i64 {
    (value * 1000.0).round() as i64
}

#[derive(Debug)]
struct Intersection {
    x: f64,
    top: f64,
    vertical: BTreeSet<usize>,
    horizontal: BTreeSet<usize>,
}

impl Intersection {
    /// Whether an edge runs between the two points
    fn connects(&self, other: &Intersection) -> bool {
        if key(self.x) == key(other.x) {
            !self.vertical.is_disjoint(&other.vertical)
        } else if key(self.top) == key(other.top) {
            !self.horizontal.is_disjoint(&other.horizontal)
        } else {
            false
        }
    }
}

fn intersections(edges: &[Edge]) -> BTreeMap<PointKey, Intersection> {
    let mut points: BTreeMap<PointKey, Intersection> = BTreeMap::new();
    let (vertical, horizontal): (Vec<(usize, &Edge)>, Vec<(usize, &Edge)>) = edges
        .iter()
        .enumerate()
        .partition(|(_, e)| e.orientation == Orientation::Vertical);

    for &(vi, v) in &vertical {
        for &(hi, h) in &horizontal {
            let crosses = h.pos >= v.start - INTERSECTION_TOLERANCE
                && h.pos <= v.end + INTERSECTION_TOLERANCE
                && v.pos >= h.start - INTERSECTION_TOLERANCE
                && v.pos <= h.end + INTERSECTION_TOLERANCE;
            if !crosses {
                continue;
            }
            let point = points
                .entry((key(v.pos), key(h.pos)))
                .or_insert_with(|| Intersection {
                    x: v.pos,
                    top: h.pos,
                    vertical: BTreeSet::new(),
                    horizontal: BTreeSet::new(),
                });
            point.vertical.insert(vi);
            point.horizontal.insert(hi);
        }
    }
    points
}

fn intersections_to_cells(points: &BTreeMap<PointKey, Intersection>) -> Vec<Cell> {
    let mut cells = Vec::new();
    for (&(px, ptop), point) in points {
        let below = points.range((px, ptop + 1)..=(px, i64::MAX));
        let right: Vec<(&PointKey, &Intersection)> = points
            .iter()
            .filter(|((x, top), _)| *top == ptop && *x > px)
            .collect();

        'below: for (&(_, btop), b) in below {
            if !point.connects(b) {
                continue;
            }
            for &(&(rx, _), r) in &right {
                if !point.connects(r) {
                    continue;
                }
                let Some(corner) = points.get(&(rx, btop)) else {
                    continue;
                };
                if corner.connects(r) && corner.connects(b) {
                    cells.push(Cell {
                        x0: point.x,
                        top: point.top,
                        x1: r.x,
                        bottom: b.top,
                    });
                    break 'below;
                }
            }
        }
    }
    cells
}

/// Group cells sharing a corner; lone cells are not tables
fn group_cells(cells: Vec<Cell>) -> Vec<Vec<Cell>> {
    let mut remaining = cells;
    let mut tables: Vec<Vec<Cell>> = Vec::new();

    while let Some(seed) = remaining.pop() {
        let mut corners: BTreeSet<PointKey> = seed.corners().into_iter().collect();
        let mut table = vec![seed];
        loop {
            let before = table.len();
            let mut i = 0;
            while i < remaining.len() {
                if remaining[i].corners().iter().any(|c| corners.contains(c)) {
                    let cell = remaining.swap_remove(i);
                    corners.extend(cell.corners());
                    table.push(cell);
                } else {
                    i += 1;
                }
            }
            if table.len() == before {
                break;
            }
        }
        if table.len() > 1 {
            tables.push(table);
        }
    }

    tables.sort_by_key(|cells| cells.iter().map(|c| (key(c.top), key(c.x0))).min());
    tables
}

/// Lay cells out by row top and column left edge; slots without a cell are `None`
fn table_rows(cells: &[Cell], runs: &[TextRun]) -> RawTable {
    let columns: BTreeSet<i64> = cells.iter().map(|c| key(c.x0)).collect();
    let mut rows: BTreeMap<i64, HashMap<i64, &Cell>> = BTreeMap::new();
    for cell in cells {
        rows.entry(key(cell.top))
            .or_default()
            .insert(key(cell.x0), cell);
    }

    rows.values()
        .map(|row| {
            columns
                .iter()
                .map(|col| row.get(col).map(|cell| cell_text(cell, runs)))
                .collect()
        })
        .collect()
}

fn cell_text(cell: &Cell, runs: &[TextRun]) -> String {
    let mut inside: Vec<&TextRun> = runs.iter().filter(|r| cell.contains(r.x, r.top)).collect();
    inside.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.x.total_cmp(&b.x)));

    let mut text = String::new();
    let mut line_top: Option<f64> = None;
    for run in inside {
        match line_top {
            Some(top) if (run.top - top).abs() <= SNAP_TOLERANCE => text.push(' '),
            Some(_) => {
                text.push('\n');
                line_top = Some(run.top);
            }
            None => line_top = Some(run.top),
        }
        text.push_str(&run.text);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(top: f64, start: f64, end: f64) -> Edge {
        Edge {
            orientation: Orientation::Horizontal,
            pos: top,
            start,
            end,
        }
    }

    fn v(x: f64, start: f64, end: f64) -> Edge {
        Edge {
            orientation: Orientation::Vertical,
            pos: x,
            start,
            end,
        }
    }

    #[test]
    fn test_merge_snaps_and_joins_collinear_edges() {
        // two halves of one rule, the second drawn a point lower
        let merged = merge_edges(vec![h(100.0, 0.0, 50.0), h(101.0, 51.0, 120.0)]);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].pos - 100.5).abs() < 1e-9);
        assert_eq!(merged[0].start, 0.0);
        assert_eq!(merged[0].end, 120.0);
    }

    #[test]
    fn test_merge_drops_short_edges() {
        let merged = merge_edges(vec![h(10.0, 0.0, 2.0), v(5.0, 0.0, 40.0)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].orientation, Orientation::Vertical);
    }

    #[test]
    fn test_grid_of_edges_yields_one_table() {
        let edges = merge_edges(vec![
            h(0.0, 0.0, 200.0),
            h(20.0, 0.0, 200.0),
            h(40.0, 0.0, 200.0),
            v(0.0, 0.0, 40.0),
            v(100.0, 0.0, 40.0),
            v(200.0, 0.0, 40.0),
        ]);
        let tables = group_cells(intersections_to_cells(&intersections(&edges)));
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].len(), 4);

        let runs = vec![
            TextRun { x: 5.0, top: 15.0, text: "a".to_string() },
            TextRun { x: 105.0, top: 35.0, text: "d".to_string() },
        ];
        let rows = table_rows(&tables[0], &runs);
        assert_eq!(
            rows,
            vec![
                vec![Some("a".to_string()), Some(String::new())],
                vec![Some(String::new()), Some("d".to_string())],
            ]
        );
    }

    #[test]
    fn test_single_box_is_not_a_table() {
        let edges = merge_edges(vec![
            h(0.0, 0.0, 100.0),
            h(20.0, 0.0, 100.0),
            v(0.0, 0.0, 20.0),
            v(100.0, 0.0, 20.0),
        ]);
        let cells = intersections_to_cells(&intersections(&edges));
        assert_eq!(cells.len(), 1);
        assert!(group_cells(cells).is_empty());
    }

    #[test]
    fn test_missing_cell_is_none() {
        // header row spans both columns
        let edges = merge_edges(vec![
            h(0.0, 0.0, 200.0),
            h(20.0, 0.0, 200.0),
            h(40.0, 0.0, 200.0),
            v(0.0, 0.0, 40.0),
            v(100.0, 20.0, 40.0),
            v(200.0, 0.0, 40.0),
        ]);
        let tables = group_cells(intersections_to_cells(&intersections(&edges)));
        assert_eq!(tables.len(), 1);
        let rows = table_rows(&tables[0], &[]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![Some(String::new()), None]);
        assert_eq!(rows[1], vec![Some(String::new()), Some(String::new())]);
    }

    #[test]
    fn test_matrix_composition() {
        let scale = Matrix([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        let shifted = Matrix::translate(10.0, 5.0).then(scale);
        assert_eq!(shifted.apply(1.0, 1.0), (22.0, 12.0));
    }
}
