//! BZ network file format
//!
//! - All data is little-endian
//! - Magic/version: `B` (66), `Z` (90), major 1, minor 0 as four u8
//! - u32 network id
//! - u32 input width, u32 output width, u32 hidden-layer count H
//! - H x u32 hidden widths
//! - Per layer, in order: all weights (column-major over output x input),
//!   then all biases, as f32
//!
//! Column-major is also the in-memory [`Matrix`] order, so weights are
//! written and read as raw storage. Activations, errors and gradients are
//! never stored.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::error::{NetworkError, Result};
use crate::matrix::Matrix;
use crate::network::{Layer, Network};
use crate::topology::Topology;

/// `B`, `Z`, format major 1, minor 0
pub const MAGIC: [u8; 4] = [66, 90, 1, 0];

/// Bytes before the hidden widths (magic, id, inputs, outputs, H).
pub const FIXED_HEADER_SIZE: u64 = 20;

/// Exact file size for `topology`, or `None` on overflow.
pub fn file_size(topology: &Topology) -> Option<u64> {
    let hidden = (topology.hidden().len() as u64).checked_mul(4)?;
    let params = topology.parameter_count()?.checked_mul(4)?;
    FIXED_HEADER_SIZE.checked_add(hidden)?.checked_add(params)
}

/// Map an unexpected EOF to [`NetworkError::Truncated`].
fn truncated(section: &'static str) -> impl FnOnce(io::Error) -> NetworkError {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            NetworkError::Truncated { section }
        } else {
            NetworkError::Io(e)
        }
    }
}

/// Read magic, id and topology.
pub fn read_header<R: Read>(reader: &mut R) -> Result<(u32, Topology)> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(truncated("magic"))?;
    if magic != MAGIC {
        return Err(NetworkError::InvalidMagic { found: magic });
    }

    let id = reader.read_u32::<LittleEndian>().map_err(truncated("network id"))?;
    let inputs = reader.read_u32::<LittleEndian>().map_err(truncated("topology"))?;
    let outputs = reader.read_u32::<LittleEndian>().map_err(truncated("topology"))?;
    let hidden_count = reader.read_u32::<LittleEndian>().map_err(truncated("topology"))?;

    // 宣言された層数ぶんを一度に確保しない（壊れたヘッダ対策）
    let mut hidden = Vec::new();
    for _ in 0..hidden_count {
        hidden.push(reader.read_u32::<LittleEndian>().map_err(truncated("hidden widths"))?);
    }

    let topology = Topology::new(inputs, outputs, hidden)?;
    if topology.parameter_count().and_then(|n| usize::try_from(n).ok()).is_none() {
        return Err(NetworkError::InvalidTopology(format!(
            "{topology} has too many parameters"
        )));
    }

    debug!("BZ header: id={id}, topology={topology}");
    Ok((id, topology))
}

impl Network {
    /// Serialize the network in BZ format.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        let topology = self.topology();

        writer.write_all(&MAGIC)?;
        writer.write_u32::<LittleEndian>(self.id())?;
        writer.write_u32::<LittleEndian>(topology.inputs())?;
        writer.write_u32::<LittleEndian>(topology.outputs())?;
        writer.write_u32::<LittleEndian>(topology.hidden().len() as u32)?;
        for &width in topology.hidden() {
            writer.write_u32::<LittleEndian>(width)?;
        }

        for layer in self.layers() {
            write_f32s(writer, layer.weights.as_slice())?;
            write_f32s(writer, layer.biases.as_slice())?;
        }
        Ok(())
    }

    /// Write to `path`, replacing any existing file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.save(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Deserialize a BZ network. Working state starts fresh.
    pub fn load<R: Read>(reader: &mut R) -> Result<Self> {
        let (id, topology) = read_header(reader)?;
        let layers = read_layers(reader, &topology)?;
        Network::from_parts(id, topology, layers)
    }

    /// Load from `path`, checking the file length against the header first.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let actual = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let (id, topology) = read_header(&mut reader)?;
        let expected = file_size(&topology).ok_or_else(|| {
            NetworkError::InvalidTopology(format!("{topology} is too large"))
        })?;
        if actual < expected {
            debug!(
                "{}: {actual} bytes, topology {topology} needs {expected}",
                path.display()
            );
            return Err(NetworkError::Truncated {
                section: "parameters",
            });
        }

        let layers = read_layers(&mut reader, &topology)?;
        Network::from_parts(id, topology, layers)
    }
}

fn write_f32s<W: Write>(writer: &mut W, values: &[f32]) -> io::Result<()> {
    for &v in values {
        writer.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

/// Floats read per call. Storage grows only as bytes arrive.
const READ_CHUNK: usize = 64 * 1024;

fn read_f32_vec<R: Read>(reader: &mut R, len: usize, section: &'static str) -> Result<Vec<f32>> {
    let mut values = Vec::with_capacity(len.min(READ_CHUNK));
    let mut chunk = vec![0.0f32; len.min(READ_CHUNK)];
    while values.len() < len {
        let n = (len - values.len()).min(READ_CHUNK);
        reader
            .read_f32_into::<LittleEndian>(&mut chunk[..n])
            .map_err(truncated(section))?;
        values.extend_from_slice(&chunk[..n]);
    }
    Ok(values)
}

fn read_layers<R: Read>(reader: &mut R, topology: &Topology) -> Result<Vec<Layer>> {
    let mut layers = Vec::with_capacity(topology.layer_count());
    for (input, output) in topology.layer_shapes() {
        let weights = read_f32_vec(reader, output as usize * input as usize, "weights")?;
        let biases = read_f32_vec(reader, output as usize, "biases")?;
        layers.push(Layer {
            weights: Matrix::from_data(output, input, weights),
            biases: Matrix::from_data(output, 1, biases),
        });
    }
    Ok(layers)
}
