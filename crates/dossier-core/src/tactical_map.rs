//! Tactical map embedded in every report
//!
//! The map is a fixed-size world canvas seen through a viewport that can be
//! dragged and zoomed. Placed on it are colored markers (suspects, vehicles,
//! entry points, ...) and drawn shapes, each carrying a label and a note.
//! A legend maps colors to their meaning for this operation.
//!
//! Coordinates:
//! - world: canvas units, origin top-left, `0..=width` x `0..=height`
//! - screen: pixels inside the viewport
//!
//! `world = offset + screen / zoom` and `screen = (world - offset) * zoom`,
//! where `offset` is the world point shown at the viewport's top-left.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

pub const MIN_ZOOM: f64 = 0.25;
pub const MAX_ZOOM: f64 = 4.0;
/// Edge length of a marker's hit box in screen pixels
pub const MARKER_SIZE: f64 = 24.0;
/// Extra reach around shapes when hit testing, in screen pixels
pub const HIT_TOLERANCE: f64 = 6.0;
pub const MAX_ELEMENTS: usize = 500;
pub const LABEL_MAX_CHARS: usize = 120;
pub const NOTE_MAX_CHARS: usize = 2_000;

pub const DEFAULT_WORLD_WIDTH: f64 = 2_000.0;
pub const DEFAULT_WORLD_HEIGHT: f64 = 1_500.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn plus(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    fn minus(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    fn scaled(self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle, `origin` is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn centered(center: Point, size: f64) -> Self {
        Self {
            origin: Point::new(center.x - size / 2.0, center.y - size / 2.0),
            width: size,
            height: size,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.origin.x
            && p.x <= self.origin.x + self.width
            && p.y >= self.origin.y
            && p.y <= self.origin.y + self.height
    }

    fn expanded(&self, by: f64) -> Rect {
        Rect {
            origin: Point::new(self.origin.x - by, self.origin.y - by),
            width: self.width + 2.0 * by,
            height: self.height + 2.0 * by,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapColor {
    Red,
    Blue,
    Green,
    Yellow,
    Orange,
    Purple,
    Black,
    White,
}

text_enum!(MapColor {
    Red => "red",
    Blue => "blue",
    Green => "green",
    Yellow => "yellow",
    Orange => "orange",
    Purple => "purple",
    Black => "black",
    White => "white",
});

impl MapColor {
    pub fn hex(&self) -> &'static str {
        match self {
            MapColor::Red => "#e53935",
            MapColor::Blue => "#1e88e5",
            MapColor::Green => "#43a047",
            MapColor::Yellow => "#fdd835",
            MapColor::Orange => "#fb8c00",
            MapColor::Purple => "#8e24aa",
            MapColor::Black => "#212121",
            MapColor::White => "#fafafa",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Suspect,
    Officer,
    Vehicle,
    Entry,
    Evidence,
    Hazard,
    Note,
}

text_enum!(MarkerKind {
    Suspect => "suspect",
    Officer => "officer",
    Vehicle => "vehicle",
    Entry => "entry",
    Evidence => "evidence",
    Hazard => "hazard",
    Note => "note",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,
    pub kind: MarkerKind,
    pub position: Point,
    pub color: MapColor,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeGeometry {
    Rectangle { rect: Rect },
    Circle { center: Point, radius: f64 },
    Polyline { points: Vec<Point> },
}

impl ShapeGeometry {
    fn check(&self, world: &Rect) -> DomainResult<()> {
        let ok = match self {
            ShapeGeometry::Rectangle { rect } => {
                rect.width > 0.0
                    && rect.height > 0.0
                    && world.contains(rect.origin)
                    && world.contains(Point::new(
                        rect.origin.x + rect.width,
                        rect.origin.y + rect.height,
                    ))
            }
            ShapeGeometry::Circle { center, radius } => {
                radius.is_finite() && *radius > 0.0 && world.contains(*center)
            }
            ShapeGeometry::Polyline { points } => {
                if points.len() < 2 {
                    return Err(DomainError::validation("A line needs at least two points"));
                }
                points.iter().all(|p| world.contains(*p))
            }
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::validation("Shape lies outside the map"))
        }
    }

    /// Whether `p` is on the shape, allowing `tolerance` world units
    fn hit(&self, p: Point, tolerance: f64) -> bool {
        match self {
            ShapeGeometry::Rectangle { rect } => rect.expanded(tolerance).contains(p),
            ShapeGeometry::Circle { center, radius } => center.distance(p) <= radius + tolerance,
            ShapeGeometry::Polyline { points } => points
                .windows(2)
                .any(|seg| segment_distance(p, seg[0], seg[1]) <= tolerance),
        }
    }
}

fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let ab = b.minus(a);
    let len_sq = ab.x * ab.x + ab.y * ab.y;
    if len_sq == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len_sq).clamp(0.0, 1.0);
    p.distance(a.plus(ab.scaled(t)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: String,
    pub geometry: ShapeGeometry,
    pub color: MapColor,
    #[serde(default = "default_stroke")]
    pub stroke_width: f64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub note: String,
}

fn default_stroke() -> f64 {
    2.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub color: MapColor,
    pub meaning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub offset: Point,
    pub zoom: f64,
    pub view_width: f64,
    pub view_height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Point::default(),
            zoom: 1.0,
            view_width: 800.0,
            view_height: 600.0,
        }
    }
}

/// Result of a hit test, topmost element first
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hit<'a> {
    Marker(&'a Marker),
    Shape(&'a Shape),
}

impl Hit<'_> {
    pub fn id(&self) -> &str {
        match self {
            Hit::Marker(m) => &m.id,
            Hit::Shape(s) => &s.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticalMap {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub shapes: Vec<Shape>,
    #[serde(default)]
    pub legend: Vec<LegendEntry>,
}

impl Default for TacticalMap {
    fn default() -> Self {
        Self {
            width: DEFAULT_WORLD_WIDTH,
            height: DEFAULT_WORLD_HEIGHT,
            viewport: Viewport::default(),
            markers: Vec::new(),
            shapes: Vec::new(),
            legend: Vec::new(),
        }
    }
}

impl TacticalMap {
    pub fn new(width: f64, height: f64, view_width: f64, view_height: f64) -> DomainResult<Self> {
        let mut map = Self {
            width,
            height,
            viewport: Viewport {
                view_width,
                view_height,
                ..Viewport::default()
            },
            ..Self::default()
        };
        map.check_dimensions()?;
        map.clamp_offset();
        Ok(map)
    }

    fn world_rect(&self) -> Rect {
        Rect {
            origin: Point::default(),
            width: self.width,
            height: self.height,
        }
    }

    fn check_dimensions(&self) -> DomainResult<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.width) || !positive(self.height) {
            return Err(DomainError::validation("Map size must be positive"));
        }
        let vp = &self.viewport;
        if !positive(vp.view_width) || !positive(vp.view_height) {
            return Err(DomainError::validation("Viewport size must be positive"));
        }
        if !vp.zoom.is_finite() || !(MIN_ZOOM..=MAX_ZOOM).contains(&vp.zoom) {
            return Err(DomainError::validation(format!(
                "Zoom must be between {MIN_ZOOM} and {MAX_ZOOM}"
            )));
        }
        if !vp.offset.is_finite() {
            return Err(DomainError::validation("Viewport offset must be finite"));
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Viewport
    // ---------------------------------------------------------------

    pub fn screen_to_world(&self, screen: Point) -> Point {
        self.viewport
            .offset
            .plus(screen.scaled(1.0 / self.viewport.zoom))
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        world.minus(self.viewport.offset).scaled(self.viewport.zoom)
    }

    /// Keep the visible area inside the world. An axis where the view is
    /// wider than the world is pinned to 0.
    fn clamp_offset(&mut self) {
        let vp = &mut self.viewport;
        let visible_w = vp.view_width / vp.zoom;
        let visible_h = vp.view_height / vp.zoom;
        let max_x = self.width - visible_w;
        let max_y = self.height - visible_h;
        vp.offset.x = if max_x <= 0.0 {
            0.0
        } else {
            vp.offset.x.clamp(0.0, max_x)
        };
        vp.offset.y = if max_y <= 0.0 {
            0.0
        } else {
            vp.offset.y.clamp(0.0, max_y)
        };
    }

    /// Drag the canvas by a screen-pixel delta
    pub fn pan(&mut self, dx: f64, dy: f64) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        let zoom = self.viewport.zoom;
        self.viewport.offset.x -= dx / zoom;
        self.viewport.offset.y -= dy / zoom;
        self.clamp_offset();
    }

    /// Multiply the zoom by `factor`, keeping the world point under
    /// `anchor` (screen) in place as far as the bounds allow
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) -> DomainResult<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(DomainError::validation("Zoom factor must be positive"));
        }
        let fixed = self.screen_to_world(anchor);
        self.viewport.zoom = (self.viewport.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.viewport.offset = fixed.minus(anchor.scaled(1.0 / self.viewport.zoom));
        self.clamp_offset();
        Ok(())
    }

    pub fn resize_view(&mut self, view_width: f64, view_height: f64) -> DomainResult<()> {
        let previous = (self.viewport.view_width, self.viewport.view_height);
        self.viewport.view_width = view_width;
        self.viewport.view_height = view_height;
        if let Err(e) = self.check_dimensions() {
            (self.viewport.view_width, self.viewport.view_height) = previous;
            return Err(e);
        }
        self.clamp_offset();
        Ok(())
    }

    // ---------------------------------------------------------------
    // Elements
    // ---------------------------------------------------------------

    fn element_count(&self) -> usize {
        self.markers.len() + self.shapes.len()
    }

    fn ensure_room(&self) -> DomainResult<()> {
        if self.element_count() >= MAX_ELEMENTS {
            return Err(DomainError::validation(format!(
                "A map holds at most {MAX_ELEMENTS} elements"
            )));
        }
        Ok(())
    }

    fn ensure_inside(&self, p: Point) -> DomainResult<()> {
        if p.is_finite() && self.world_rect().contains(p) {
            Ok(())
        } else {
            Err(DomainError::validation("Position lies outside the map"))
        }
    }

    pub fn add_marker(
        &mut self,
        kind: MarkerKind,
        position: Point,
        color: MapColor,
        label: &str,
    ) -> DomainResult<String> {
        self.ensure_room()?;
        self.ensure_inside(position)?;
        let label = check_label(label)?;
        let id = Uuid::new_v4().to_string();
        self.markers.push(Marker {
            id: id.clone(),
            kind,
            position,
            color,
            label,
            note: String::new(),
        });
        Ok(id)
    }

    pub fn move_marker(&mut self, id: &str, position: Point) -> DomainResult<()> {
        self.ensure_inside(position)?;
        let marker = self
            .markers
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| DomainError::NotFound(format!("marker {id}")))?;
        marker.position = position;
        Ok(())
    }

    pub fn add_shape(
        &mut self,
        geometry: ShapeGeometry,
        color: MapColor,
        label: &str,
    ) -> DomainResult<String> {
        self.ensure_room()?;
        geometry.check(&self.world_rect())?;
        let label = check_label(label)?;
        let id = Uuid::new_v4().to_string();
        self.shapes.push(Shape {
            id: id.clone(),
            geometry,
            color,
            stroke_width: default_stroke(),
            label,
            note: String::new(),
        });
        Ok(id)
    }

    /// Replace label and note of any element
    pub fn set_metadata(&mut self, id: &str, label: &str, note: &str) -> DomainResult<()> {
        let label = check_label(label)?;
        let note = check_note(note)?;
        if let Some(m) = self.markers.iter_mut().find(|m| m.id == id) {
            m.label = label;
            m.note = note;
            return Ok(());
        }
        if let Some(s) = self.shapes.iter_mut().find(|s| s.id == id) {
            s.label = label;
            s.note = note;
            return Ok(());
        }
        Err(DomainError::NotFound(format!("map element {id}")))
    }

    pub fn remove_element(&mut self, id: &str) -> DomainResult<()> {
        let before = self.element_count();
        self.markers.retain(|m| m.id != id);
        self.shapes.retain(|s| s.id != id);
        if self.element_count() == before {
            return Err(DomainError::NotFound(format!("map element {id}")));
        }
        Ok(())
    }

    /// Topmost element under a screen point. Markers sit above shapes and
    /// later elements above earlier ones.
    pub fn hit_test(&self, screen: Point) -> Option<Hit<'_>> {
        let world = self.screen_to_world(screen);
        let zoom = self.viewport.zoom;
        let marker_size = MARKER_SIZE / zoom;

        if let Some(m) = self
            .markers
            .iter()
            .rev()
            .find(|m| Rect::centered(m.position, marker_size).contains(world))
        {
            return Some(Hit::Marker(m));
        }

        self.shapes
            .iter()
            .rev()
            .find(|s| {
                let reach = (HIT_TOLERANCE + s.stroke_width / 2.0) / zoom;
                s.geometry.hit(world, reach)
            })
            .map(Hit::Shape)
    }

    // ---------------------------------------------------------------
    // Legend
    // ---------------------------------------------------------------

    pub fn set_legend_entry(&mut self, color: MapColor, meaning: &str) -> DomainResult<()> {
        let meaning = meaning.trim();
        if meaning.is_empty() || meaning.chars().count() > LABEL_MAX_CHARS {
            return Err(DomainError::validation(format!(
                "Legend text must be 1 to {LABEL_MAX_CHARS} characters"
            )));
        }
        match self.legend.iter_mut().find(|e| e.color == color) {
            Some(entry) => entry.meaning = meaning.to_string(),
            None => self.legend.push(LegendEntry {
                color,
                meaning: meaning.to_string(),
            }),
        }
        Ok(())
    }

    pub fn remove_legend_entry(&mut self, color: MapColor) -> bool {
        let before = self.legend.len();
        self.legend.retain(|e| e.color != color);
        self.legend.len() != before
    }

    pub fn legend_meaning(&self, color: MapColor) -> Option<&str> {
        self.legend
            .iter()
            .find(|e| e.color == color)
            .map(|e| e.meaning.as_str())
    }

    fn used_colors(&self) -> Vec<MapColor> {
        let mut seen = Vec::new();
        let colors = self
            .markers
            .iter()
            .map(|m| m.color)
            .chain(self.shapes.iter().map(|s| s.color));
        for c in colors {
            if !seen.contains(&c) {
                seen.push(c);
            }
        }
        seen
    }

    /// Colors placed on the map that the legend does not explain
    pub fn unlabelled_colors(&self) -> Vec<MapColor> {
        self.used_colors()
            .into_iter()
            .filter(|c| self.legend_meaning(*c).is_none())
            .collect()
    }

    /// Legend entries whose color appears nowhere on the map
    pub fn unused_legend_colors(&self) -> Vec<MapColor> {
        let used = self.used_colors();
        self.legend
            .iter()
            .map(|e| e.color)
            .filter(|c| !used.contains(c))
            .collect()
    }

    // ---------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------

    /// Check a map received from a client and clamp its viewport
    pub fn validated(mut self) -> DomainResult<Self> {
        self.check_dimensions()?;

        if self.element_count() > MAX_ELEMENTS {
            return Err(DomainError::validation(format!(
                "A map holds at most {MAX_ELEMENTS} elements"
            )));
        }

        let mut ids = HashSet::new();
        let world = self.world_rect();
        for m in &self.markers {
            if m.id.is_empty() || !ids.insert(m.id.as_str()) {
                return Err(DomainError::validation("Map element ids must be unique"));
            }
            self.ensure_inside(m.position)?;
            check_label(&m.label)?;
            check_note(&m.note)?;
        }
        for s in &self.shapes {
            if s.id.is_empty() || !ids.insert(s.id.as_str()) {
                return Err(DomainError::validation("Map element ids must be unique"));
            }
            s.geometry.check(&world)?;
            if !s.stroke_width.is_finite() || s.stroke_width <= 0.0 || s.stroke_width > 50.0 {
                return Err(DomainError::validation("Stroke width must be in (0, 50]"));
            }
            check_label(&s.label)?;
            check_note(&s.note)?;
        }

        let mut colors = HashSet::new();
        for entry in &self.legend {
            if !colors.insert(entry.color) {
                return Err(DomainError::validation("Each legend color may appear once"));
            }
            let len = entry.meaning.trim().chars().count();
            if len == 0 || len > LABEL_MAX_CHARS {
                return Err(DomainError::validation(format!(
                    "Legend text must be 1 to {LABEL_MAX_CHARS} characters"
                )));
            }
        }

        self.clamp_offset();
        Ok(self)
    }
}

fn check_label(label: &str) -> DomainResult<String> {
    let label = label.trim();
    if label.chars().count() > LABEL_MAX_CHARS {
        return Err(DomainError::validation(format!(
            "Labels must be at most {LABEL_MAX_CHARS} characters"
        )));
    }
    Ok(label.to_string())
}

fn check_note(note: &str) -> DomainResult<String> {
    if note.chars().count() > NOTE_MAX_CHARS {
        return Err(DomainError::validation(format!(
            "Notes must be at most {NOTE_MAX_CHARS} characters"
        )));
    }
    Ok(note.to_string())
}
