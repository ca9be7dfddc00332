//! PLY format support
//!
//! Samples are read from the `vertex` element: `x`/`y`/`z` are required,
//! `nx`/`ny`/`nz`, `value` (the sample scale), `confidence` and
//! `red`/`green`/`blue` are optional. Meshes are written with the same
//! attribute names so a reconstructed surface can be fed back into the tools.

use crate::{MeshReader, MeshWriter};
use floatscale_core::{
    Color3f, Error, PointRecord, PointSource, Point3f, Result, TriangleMesh, Vector3f,
};
use ply_rs::{
    parser::Parser,
    ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    },
    writer::Writer,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct PlyReader;
pub struct PlyWriter;

/// PLY encoding used when writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

impl From<PlyFormat> for Encoding {
    fn from(format: PlyFormat) -> Self {
        match format {
            PlyFormat::Ascii => Encoding::Ascii,
            PlyFormat::BinaryLittleEndian => Encoding::BinaryLittleEndian,
            PlyFormat::BinaryBigEndian => Encoding::BinaryBigEndian,
        }
    }
}

/// Options controlling which vertex attributes are written
#[derive(Debug, Clone)]
pub struct PlyWriteOptions {
    pub format: PlyFormat,
    pub include_normals: bool,
    pub include_colors: bool,
    pub include_confidences: bool,
    pub include_values: bool,
    pub comments: Vec<String>,
}

impl Default for PlyWriteOptions {
    fn default() -> Self {
        Self {
            format: PlyFormat::BinaryLittleEndian,
            include_normals: true,
            include_colors: true,
            include_confidences: true,
            include_values: true,
            comments: Vec::new(),
        }
    }
}

impl PlyWriteOptions {
    /// Default options with ASCII encoding
    pub fn ascii() -> Self {
        Self {
            format: PlyFormat::Ascii,
            ..Self::default()
        }
    }

    /// Set the encoding
    pub fn with_format(mut self, format: PlyFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable normals
    pub fn with_normals(mut self, include: bool) -> Self {
        self.include_normals = include;
        self
    }

    /// Enable or disable colors
    pub fn with_colors(mut self, include: bool) -> Self {
        self.include_colors = include;
        self
    }

    /// Enable or disable confidences
    pub fn with_confidences(mut self, include: bool) -> Self {
        self.include_confidences = include;
        self
    }

    /// Enable or disable values (scales)
    pub fn with_values(mut self, include: bool) -> Self {
        self.include_values = include;
        self
    }

    /// Add a header comment
    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comments.push(comment.into());
        self
    }
}

/// A PLY file of oriented samples.
///
/// The file is parsed again on every call to [`PointSource::records`]. The
/// ply-rs parser only reads whole payloads, so each pass holds the records
/// of one file in memory; nothing is kept between passes.
#[derive(Debug, Clone)]
pub struct PlySampleSource {
    path: PathBuf,
}

impl PlySampleSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PointSource for PlySampleSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn records(&self) -> Result<Box<dyn Iterator<Item = PointRecord> + '_>> {
        let records = PlyReader::read_point_records(&self.path)?;
        Ok(Box::new(records.into_iter()))
    }
}

impl PlyReader {
    /// Read every vertex of a PLY file as a raw point record
    pub fn read_point_records<P: AsRef<Path>>(path: P) -> Result<Vec<PointRecord>> {
        let path = path.as_ref();
        let ply = read_ply(path)?;

        let Some(vertex_element) = ply.payload.get("vertex") else {
            return Err(Error::InvalidData(format!(
                "PLY file {} has no vertex element",
                path.display()
            )));
        };

        let records = vertex_element
            .iter()
            .map(|vertex| {
                Ok(PointRecord {
                    position: extract_position(vertex)?,
                    normal: extract_normal(vertex),
                    scale: extract_optional(vertex, "value"),
                    confidence: extract_optional(vertex, "confidence"),
                    color: extract_color(vertex),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Read {} point records from {}", records.len(), path.display());
        Ok(records)
    }
}

impl MeshReader for PlyReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let ply = read_ply(path.as_ref())?;

        let vertex_element: &[DefaultElement] = ply
            .payload
            .get("vertex")
            .map(Vec::as_slice)
            .unwrap_or_default();

        let vertices = vertex_element
            .iter()
            .map(extract_position)
            .collect::<Result<Vec<_>>>()?;

        let mut faces = Vec::new();
        if let Some(face_element) = ply.payload.get("face") {
            for face in face_element {
                let indices = extract_face_indices(face)?;
                if indices.len() == 3 {
                    faces.push([indices[0], indices[1], indices[2]]);
                } else if indices.len() > 3 {
                    // Fan triangulation for polygons
                    for i in 1..indices.len() - 1 {
                        faces.push([indices[0], indices[i], indices[i + 1]]);
                    }
                }
            }
        }

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        if let Some(normals) = collect_all(vertex_element, extract_normal) {
            mesh.set_normals(normals);
        }
        if let Some(colors) = collect_all(vertex_element, extract_color) {
            mesh.set_colors(colors);
        }
        if let Some(confidences) = collect_all(vertex_element, |v| extract_optional(v, "confidence")) {
            mesh.set_confidences(confidences);
        }
        if let Some(values) = collect_all(vertex_element, |v| extract_optional(v, "value")) {
            mesh.set_values(values);
        }
        mesh.validate()?;

        Ok(mesh)
    }
}

impl MeshWriter for PlyWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        Self::write_mesh_with_options(mesh, path, &PlyWriteOptions::default())
    }
}

impl PlyWriter {
    /// Write a mesh with explicit attribute options.
    ///
    /// Channels missing from the mesh are skipped regardless of the options.
    pub fn write_mesh_with_options<P: AsRef<Path>>(
        mesh: &TriangleMesh,
        path: P,
        options: &PlyWriteOptions,
    ) -> Result<()> {
        mesh.validate()?;

        let normals = mesh.normals.as_deref().filter(|_| options.include_normals);
        let colors = mesh.colors.as_deref().filter(|_| options.include_colors);
        let confidences = mesh
            .confidences
            .as_deref()
            .filter(|_| options.include_confidences);
        let values = mesh.values.as_deref().filter(|_| options.include_values);

        let mut ply = new_ply(options);

        let mut vertex_element = ElementDef::new("vertex".to_string());
        vertex_element.count = mesh.vertices.len();
        add_float_properties(&mut vertex_element, &["x", "y", "z"]);
        if normals.is_some() {
            add_float_properties(&mut vertex_element, &["nx", "ny", "nz"]);
        }
        if colors.is_some() {
            add_color_properties(&mut vertex_element);
        }
        if confidences.is_some() {
            add_float_properties(&mut vertex_element, &["confidence"]);
        }
        if values.is_some() {
            add_float_properties(&mut vertex_element, &["value"]);
        }
        ply.header.elements.add(vertex_element);

        let mut face_element = ElementDef::new("face".to_string());
        face_element.count = mesh.faces.len();
        face_element.properties.add(PropertyDef::new(
            "vertex_indices".to_string(),
            PropertyType::List(ScalarType::UChar, ScalarType::Int),
        ));
        ply.header.elements.add(face_element);

        let mut vertices = Vec::with_capacity(mesh.vertices.len());
        for (i, vertex) in mesh.vertices.iter().enumerate() {
            let mut element = DefaultElement::new();
            insert_position(&mut element, vertex);
            if let Some(normals) = normals {
                insert_normal(&mut element, &normals[i]);
            }
            if let Some(colors) = colors {
                insert_color(&mut element, &colors[i]);
            }
            if let Some(confidences) = confidences {
                element.insert("confidence".to_string(), Property::Float(confidences[i]));
            }
            if let Some(values) = values {
                element.insert("value".to_string(), Property::Float(values[i]));
            }
            vertices.push(element);
        }
        ply.payload.insert("vertex".to_string(), vertices);

        let faces = mesh
            .faces
            .iter()
            .map(|face| {
                let mut element = DefaultElement::new();
                let indices = face.iter().map(|&i| i as i32).collect();
                element.insert("vertex_indices".to_string(), Property::ListInt(indices));
                element
            })
            .collect();
        ply.payload.insert("face".to_string(), faces);

        write_ply(path.as_ref(), &mut ply)
    }

    /// Write raw point records as a sample file readable by [`PlySampleSource`]
    pub fn write_point_records<P: AsRef<Path>>(
        records: &[PointRecord],
        path: P,
        options: &PlyWriteOptions,
    ) -> Result<()> {
        let has_normals = records.iter().all(|r| r.normal.is_some());
        let has_values = records.iter().all(|r| r.scale.is_some());
        let has_confidences = records.iter().all(|r| r.confidence.is_some());
        let has_colors = records.iter().all(|r| r.color.is_some());

        let mut ply = new_ply(options);
        let mut vertex_element = ElementDef::new("vertex".to_string());
        vertex_element.count = records.len();
        add_float_properties(&mut vertex_element, &["x", "y", "z"]);
        if has_normals {
            add_float_properties(&mut vertex_element, &["nx", "ny", "nz"]);
        }
        if has_colors {
            add_color_properties(&mut vertex_element);
        }
        if has_confidences {
            add_float_properties(&mut vertex_element, &["confidence"]);
        }
        if has_values {
            add_float_properties(&mut vertex_element, &["value"]);
        }
        ply.header.elements.add(vertex_element);

        let vertices = records
            .iter()
            .map(|record| {
                let mut element = DefaultElement::new();
                insert_position(&mut element, &record.position);
                if let (true, Some(normal)) = (has_normals, record.normal) {
                    insert_normal(&mut element, &normal);
                }
                if let (true, Some(color)) = (has_colors, record.color) {
                    insert_color(&mut element, &color);
                }
                if let (true, Some(confidence)) = (has_confidences, record.confidence) {
                    element.insert("confidence".to_string(), Property::Float(confidence));
                }
                if let (true, Some(scale)) = (has_values, record.scale) {
                    element.insert("value".to_string(), Property::Float(scale));
                }
                element
            })
            .collect();
        ply.payload.insert("vertex".to_string(), vertices);

        write_ply(path.as_ref(), &mut ply)
    }
}

fn read_ply(path: &Path) -> Result<Ply<DefaultElement>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let parser = Parser::<DefaultElement>::new();
    Ok(parser.read_ply(&mut reader)?)
}

fn new_ply(options: &PlyWriteOptions) -> Ply<DefaultElement> {
    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = options.format.into();
    ply.header.comments.extend(options.comments.iter().cloned());
    ply
}

fn write_ply(path: &Path, ply: &mut Ply<DefaultElement>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let writer_instance = Writer::new();
    let big_endian = match ply.header.encoding {
        Encoding::Ascii => {
            writer_instance.write_ply(&mut writer, ply)?;
            writer.flush()?;
            return Ok(());
        }
        Encoding::BinaryBigEndian => true,
        Encoding::BinaryLittleEndian => false,
    };

    ply.make_consistent()
        .map_err(|e| Error::InvalidData(format!("Inconsistent PLY data: {:?}", e)))?;
    writer_instance.write_header(&mut writer, &ply.header)?;
    for (name, element_def) in &ply.header.elements {
        let Some(elements) = ply.payload.get(name) else {
            continue;
        };
        let has_lists = element_def
            .properties
            .values()
            .any(|p| matches!(p.data_type, PropertyType::List(..)));
        if has_lists {
            for element in elements {
                write_binary_list_element(&mut writer, element, element_def, big_endian)?;
            }
        } else {
            writer_instance.write_payload_of_element(
                &mut writer,
                elements,
                element_def,
                &ply.header,
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Binary encoding of an element with list properties.
///
/// ply-rs writes the element count as the length of every binary list, so
/// the face element is encoded here with the real list lengths.
fn write_binary_list_element<W: Write>(
    out: &mut W,
    element: &DefaultElement,
    element_def: &ElementDef,
    big_endian: bool,
) -> Result<()> {
    let put = |out: &mut W, le: &[u8], be: &[u8]| out.write_all(if big_endian { be } else { le });
    for (name, property_def) in &element_def.properties {
        match (&property_def.data_type, element.get(name)) {
            (PropertyType::Scalar(ScalarType::Float), Some(Property::Float(x))) => {
                put(out, &x.to_le_bytes(), &x.to_be_bytes())?
            }
            (PropertyType::Scalar(ScalarType::UChar), Some(Property::UChar(x))) => {
                out.write_all(&[*x])?
            }
            (PropertyType::List(ScalarType::UChar, ScalarType::Int), Some(Property::ListInt(list))) => {
                let len = u8::try_from(list.len()).map_err(|_| {
                    Error::InvalidData(format!("List '{}' has {} entries", name, list.len()))
                })?;
                out.write_all(&[len])?;
                for x in list {
                    put(out, &x.to_le_bytes(), &x.to_be_bytes())?;
                }
            }
            _ => {
                return Err(Error::InvalidData(format!(
                    "Unsupported binary property '{}'",
                    name
                )))
            }
        }
    }
    Ok(())
}

fn add_float_properties(element: &mut ElementDef, names: &[&str]) {
    for name in names {
        element.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
}

fn add_color_properties(element: &mut ElementDef) {
    for name in ["red", "green", "blue"] {
        element.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::UChar),
        ));
    }
}

fn insert_position(element: &mut DefaultElement, position: &Point3f) {
    element.insert("x".to_string(), Property::Float(position.x));
    element.insert("y".to_string(), Property::Float(position.y));
    element.insert("z".to_string(), Property::Float(position.z));
}

fn insert_normal(element: &mut DefaultElement, normal: &Vector3f) {
    element.insert("nx".to_string(), Property::Float(normal.x));
    element.insert("ny".to_string(), Property::Float(normal.y));
    element.insert("nz".to_string(), Property::Float(normal.z));
}

fn insert_color(element: &mut DefaultElement, color: &Color3f) {
    for (name, c) in ["red", "green", "blue"].iter().zip(color.iter()) {
        let byte = (c * 255.0).round().clamp(0.0, 255.0) as u8;
        element.insert(name.to_string(), Property::UChar(byte));
    }
}

/// Convert a scalar PLY property to f32
fn scalar_value(property: &Property) -> Option<f32> {
    match *property {
        Property::Char(v) => Some(v as f32),
        Property::UChar(v) => Some(v as f32),
        Property::Short(v) => Some(v as f32),
        Property::UShort(v) => Some(v as f32),
        Property::Int(v) => Some(v as f32),
        Property::UInt(v) => Some(v as f32),
        Property::Float(v) => Some(v),
        Property::Double(v) => Some(v as f32),
        _ => None,
    }
}

fn extract_optional(element: &DefaultElement, name: &str) -> Option<f32> {
    element.get(name).and_then(scalar_value)
}

/// Extract a property value as f32 from a PLY element
fn extract_property_value(element: &DefaultElement, name: &str) -> Result<f32> {
    extract_optional(element, name).ok_or_else(|| {
        Error::InvalidData(format!("Property '{}' not found or invalid type", name))
    })
}

fn extract_position(element: &DefaultElement) -> Result<Point3f> {
    Ok(Point3f::new(
        extract_property_value(element, "x")?,
        extract_property_value(element, "y")?,
        extract_property_value(element, "z")?,
    ))
}

fn extract_normal(element: &DefaultElement) -> Option<Vector3f> {
    Some(Vector3f::new(
        extract_optional(element, "nx")?,
        extract_optional(element, "ny")?,
        extract_optional(element, "nz")?,
    ))
}

/// Integer color channels are scaled from `[0, 255]`, float channels are kept.
fn extract_color(element: &DefaultElement) -> Option<Color3f> {
    let mut color = [0.0; 3];
    for (channel, name) in color.iter_mut().zip(["red", "green", "blue"]) {
        let property = element.get(name)?;
        let value = scalar_value(property)?;
        *channel = match property {
            Property::Float(_) | Property::Double(_) => value,
            _ => value / 255.0,
        };
    }
    Some(color)
}

/// Collect an optional attribute for every vertex, `None` if any vertex lacks it
fn collect_all<T>(
    elements: &[DefaultElement],
    extract: impl Fn(&DefaultElement) -> Option<T>,
) -> Option<Vec<T>> {
    if elements.is_empty() {
        return None;
    }
    elements.iter().map(extract).collect()
}

/// Extract face indices from a PLY face element
fn extract_face_indices(element: &DefaultElement) -> Result<Vec<usize>> {
    match element
        .get("vertex_indices")
        .or_else(|| element.get("vertex_index"))
    {
        Some(Property::ListInt(indices)) => Ok(indices.iter().map(|&idx| idx as usize).collect()),
        Some(Property::ListUInt(indices)) => Ok(indices.iter().map(|&idx| idx as usize).collect()),
        _ => Err(Error::InvalidData("Face indices not found".to_string())),
    }
}
