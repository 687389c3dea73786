//! Quantized model export.
//!
//! A trained [`MlpClassifier`] is exported as a compact little-endian binary:
//!
//! ```text
//! magic      4 bytes  "ADQM"
//! version    u16      1
//! layers     u16
//! per layer:
//!   input    u32
//!   output   u32
//!   activ.   u8       0 = ReLU, 1 = softmax
//!   dtype    u8       0 = f32, 1 = int8
//!   int8:    f32 x output scales, then i8 x (input * output) weights
//!   f32:     f32 x (input * output) weights
//!   bias     f32 x output
//! crc32      u32      over every preceding byte
//! ```
//!
//! Weights are input-major. Int8 weights use one symmetric scale per output
//! unit (`max |w| / 127`), so `w ~= q * scale[output]`.

use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{AdsieveError, Result};
use crate::ml::classifier::{Scorer, check_input, softmax};
use crate::ml::mlp::{Activation, MlpClassifier};

const MAGIC: &[u8; 4] = b"ADQM";
const FORMAT_VERSION: u16 = 1;

/// Weight encoding of an exported model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuantizationMethod {
    /// Full-precision weights.
    Float32,
    /// 8-bit weights with per-output scales.
    #[default]
    Int8,
}

#[derive(Debug, Clone, PartialEq)]
enum LayerWeights {
    Float32(Vec<f32>),
    Int8 { scales: Vec<f32>, values: Vec<i8> },
}

#[derive(Debug, Clone, PartialEq)]
struct QuantizedLayer {
    input_dim: usize,
    output_dim: usize,
    activation: Activation,
    weights: LayerWeights,
    bias: Vec<f32>,
}

impl QuantizedLayer {
    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let out_dim = self.output_dim;
        let mut out = vec![0.0f32; out_dim];
        for (i, &x) in input.iter().enumerate() {
            if x == 0.0 {
                continue;
            }
            let range = i * out_dim..(i + 1) * out_dim;
            match &self.weights {
                LayerWeights::Float32(w) => {
                    for (o, &w) in out.iter_mut().zip(&w[range]) {
                        *o += x * w;
                    }
                }
                LayerWeights::Int8 { values, .. } => {
                    for (o, &q) in out.iter_mut().zip(&values[range]) {
                        *o += x * f32::from(q);
                    }
                }
            }
        }
        if let LayerWeights::Int8 { scales, .. } = &self.weights {
            for (o, s) in out.iter_mut().zip(scales) {
                *o *= s;
            }
        }
        for (o, b) in out.iter_mut().zip(&self.bias) {
            *o += b;
        }
        match self.activation {
            Activation::Relu => out.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Softmax => softmax(&mut out),
        }
        out
    }
}

/// A model decoded from (or ready to be encoded into) the binary format.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedModel {
    method: QuantizationMethod,
    layers: Vec<QuantizedLayer>,
}

impl QuantizedModel {
    /// Encode the weights of `model` with `method`.
    pub fn quantize(model: &MlpClassifier, method: QuantizationMethod) -> Self {
        let layers = model
            .layers()
            .iter()
            .map(|layer| {
                let weights = match method {
                    QuantizationMethod::Float32 => LayerWeights::Float32(layer.weights().to_vec()),
                    QuantizationMethod::Int8 => {
                        quantize_int8(layer.weights(), layer.input_dim(), layer.output_dim())
                    }
                };
                QuantizedLayer {
                    input_dim: layer.input_dim(),
                    output_dim: layer.output_dim(),
                    activation: layer.activation(),
                    weights,
                    bias: layer.bias().to_vec(),
                }
            })
            .collect();
        Self { method, layers }
    }

    pub fn method(&self) -> QuantizationMethod {
        self.method
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// `(input, output)` width of each layer.
    pub fn layer_shapes(&self) -> Vec<(usize, usize)> {
        self.layers
            .iter()
            .map(|l| (l.input_dim, l.output_dim))
            .collect()
    }

    /// Approximate in-memory size of the weights and biases in bytes.
    pub fn memory_size(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| {
                let weights = match &layer.weights {
                    LayerWeights::Float32(w) => w.len() * 4,
                    LayerWeights::Int8 { scales, values } => scales.len() * 4 + values.len(),
                };
                weights + layer.bias.len() * 4
            })
            .sum()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.memory_size() + 64);
        buf.extend_from_slice(MAGIC);
        buf.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        buf.write_u16::<LittleEndian>(to_u16(self.layers.len())?)?;

        for layer in &self.layers {
            buf.write_u32::<LittleEndian>(to_u32(layer.input_dim)?)?;
            buf.write_u32::<LittleEndian>(to_u32(layer.output_dim)?)?;
            buf.write_u8(match layer.activation {
                Activation::Relu => 0,
                Activation::Softmax => 1,
            })?;
            match &layer.weights {
                LayerWeights::Float32(weights) => {
                    buf.write_u8(0)?;
                    for &w in weights {
                        buf.write_f32::<LittleEndian>(w)?;
                    }
                }
                LayerWeights::Int8 { scales, values } => {
                    buf.write_u8(1)?;
                    for &s in scales {
                        buf.write_f32::<LittleEndian>(s)?;
                    }
                    for &q in values {
                        buf.write_i8(q)?;
                    }
                }
            }
            for &b in &layer.bias {
                buf.write_f32::<LittleEndian>(b)?;
            }
        }

        let checksum = crc32fast::hash(&buf);
        buf.write_u32::<LittleEndian>(checksum)?;
        Ok(buf)
    }

    /// Decode and validate an exported model.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MAGIC.len() + 8 {
            return Err(AdsieveError::corrupt(format!(
                "model of {} bytes is too short",
                bytes.len()
            )));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(AdsieveError::corrupt(format!(
                "model checksum mismatch: stored {stored:08x}, computed {computed:08x}"
            )));
        }

        let mut cursor = Cursor::new(body);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic).map_err(truncated)?;
        if &magic != MAGIC {
            return Err(AdsieveError::corrupt("not a quantized model file"));
        }
        let version = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        if version != FORMAT_VERSION {
            return Err(AdsieveError::corrupt(format!(
                "unsupported model format version {version}"
            )));
        }
        let layer_count = cursor.read_u16::<LittleEndian>().map_err(truncated)? as usize;
        if layer_count == 0 {
            return Err(AdsieveError::corrupt("model has no layers"));
        }

        let mut layers = Vec::with_capacity(layer_count);
        let mut method = QuantizationMethod::Float32;
        for index in 0..layer_count {
            let input_dim = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
            let output_dim = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
            let activation = match cursor.read_u8().map_err(truncated)? {
                0 => Activation::Relu,
                1 => Activation::Softmax,
                other => {
                    return Err(AdsieveError::corrupt(format!(
                        "layer {index}: unknown activation {other}"
                    )));
                }
            };
            let dtype = cursor.read_u8().map_err(truncated)?;

            let count = input_dim
                .checked_mul(output_dim)
                .filter(|&n| n > 0)
                .ok_or_else(|| {
                    AdsieveError::corrupt(format!(
                        "layer {index}: invalid shape {input_dim}x{output_dim}"
                    ))
                })?;
            let remaining = body.len() - cursor.position() as usize;
            if count > remaining {
                return Err(AdsieveError::corrupt(format!(
                    "layer {index}: {count} weights exceed the remaining {remaining} bytes"
                )));
            }

            let weights = match dtype {
                0 => LayerWeights::Float32(read_f32s(&mut cursor, count)?),
                1 => {
                    method = QuantizationMethod::Int8;
                    let scales = read_f32s(&mut cursor, output_dim)?;
                    let mut values = vec![0i8; count];
                    cursor.read_i8_into(&mut values).map_err(truncated)?;
                    LayerWeights::Int8 { scales, values }
                }
                other => {
                    return Err(AdsieveError::corrupt(format!(
                        "layer {index}: unknown weight type {other}"
                    )));
                }
            };
            let bias = read_f32s(&mut cursor, output_dim)?;

            layers.push(QuantizedLayer {
                input_dim,
                output_dim,
                activation,
                weights,
                bias,
            });
        }

        if cursor.position() as usize != body.len() {
            return Err(AdsieveError::corrupt(format!(
                "{} trailing bytes after the last layer",
                body.len() - cursor.position() as usize
            )));
        }
        validate_chain(&layers)?;
        Ok(Self { method, layers })
    }
}

impl Scorer for QuantizedModel {
    fn input_dim(&self) -> usize {
        self.layers[0].input_dim
    }

    fn num_classes(&self) -> usize {
        self.layers[self.layers.len() - 1].output_dim
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
        check_input(self.input_dim(), features)?;
        let mut activations = features.to_vec();
        for layer in &self.layers {
            activations = layer.forward(&activations);
        }
        Ok(activations)
    }

    fn name(&self) -> &str {
        match self.method {
            QuantizationMethod::Float32 => "mlp-f32",
            QuantizationMethod::Int8 => "mlp-int8",
        }
    }
}

/// Turns a trained classifier into the deployable binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelExporter {
    method: QuantizationMethod,
}

impl ModelExporter {
    pub fn new(method: QuantizationMethod) -> Self {
        Self { method }
    }

    pub fn export(&self, model: &MlpClassifier) -> Result<Vec<u8>> {
        let quantized = QuantizedModel::quantize(model, self.method);
        let bytes = quantized.to_bytes()?;
        info!(
            "export: {:?} model, {} layers, {} bytes ({} float parameters)",
            self.method,
            quantized.layer_count(),
            bytes.len(),
            model.parameter_count()
        );
        Ok(bytes)
    }
}

fn quantize_int8(weights: &[f32], input_dim: usize, output_dim: usize) -> LayerWeights {
    let mut scales = vec![0.0f32; output_dim];
    for i in 0..input_dim {
        for (j, scale) in scales.iter_mut().enumerate() {
            *scale = scale.max(weights[i * output_dim + j].abs());
        }
    }
    for scale in scales.iter_mut() {
        *scale = if *scale > 0.0 { *scale / 127.0 } else { 1.0 };
    }
    let values = weights
        .iter()
        .enumerate()
        .map(|(k, &w)| (w / scales[k % output_dim]).round().clamp(-127.0, 127.0) as i8)
        .collect();
    LayerWeights::Int8 { scales, values }
}

fn validate_chain(layers: &[QuantizedLayer]) -> Result<()> {
    for (index, layer) in layers.iter().enumerate() {
        let is_last = index + 1 == layers.len();
        let expected = if is_last {
            Activation::Softmax
        } else {
            Activation::Relu
        };
        if layer.activation != expected {
            return Err(AdsieveError::corrupt(format!(
                "layer {index}: expected {expected:?} activation, found {:?}",
                layer.activation
            )));
        }
        if let Some(next) = layers.get(index + 1) {
            if next.input_dim != layer.output_dim {
                return Err(AdsieveError::corrupt(format!(
                    "layer {} takes {} inputs but layer {index} produces {}",
                    index + 1,
                    next.input_dim,
                    layer.output_dim
                )));
            }
        }
        if is_last && layer.output_dim < 2 {
            return Err(AdsieveError::corrupt("output layer has fewer than 2 classes"));
        }
    }
    Ok(())
}

fn read_f32s(cursor: &mut Cursor<&[u8]>, count: usize) -> Result<Vec<f32>> {
    let mut values = vec![0.0f32; count];
    cursor
        .read_f32_into::<LittleEndian>(&mut values)
        .map_err(truncated)?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(AdsieveError::corrupt("non-finite value in model parameters"));
    }
    Ok(values)
}

fn truncated(e: io::Error) -> AdsieveError {
    AdsieveError::corrupt(format!("truncated model file: {e}"))
}

fn to_u16(n: usize) -> Result<u16> {
    u16::try_from(n).map_err(|_| AdsieveError::invalid_argument(format!("{n} does not fit in u16")))
}

fn to_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| AdsieveError::invalid_argument(format!("{n} does not fit in u32")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::mlp::DenseLayer;

    fn model() -> MlpClassifier {
        let hidden = DenseLayer::new(
            3,
            2,
            vec![0.5, -1.0, 0.25, 0.75, -0.3, 0.1],
            vec![0.1, 0.0],
            Activation::Relu,
        )
        .unwrap();
        let output = DenseLayer::new(
            2,
            2,
            vec![1.0, -1.0, -0.5, 0.8],
            vec![0.0, 0.05],
            Activation::Softmax,
        )
        .unwrap();
        MlpClassifier::new(vec![hidden, output]).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let bytes = ModelExporter::new(QuantizationMethod::Int8)
            .export(&model())
            .unwrap();
        assert_eq!(&bytes[..4], b"ADQM");
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 1);
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 2);
        assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 3);
    }

    #[test]
    fn test_float32_export_is_exact() {
        let model = model();
        let bytes = ModelExporter::new(QuantizationMethod::Float32)
            .export(&model)
            .unwrap();
        let decoded = QuantizedModel::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.method(), QuantizationMethod::Float32);

        let x = [0.2, 0.0, 0.9];
        assert_eq!(
            decoded.predict_proba(&x).unwrap(),
            model.predict_proba(&x).unwrap()
        );
    }

    #[test]
    fn test_int8_export_is_close() {
        let model = model();
        let bytes = ModelExporter::default().export(&model).unwrap();
        let decoded = QuantizedModel::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.method(), QuantizationMethod::Int8);
        assert_eq!(decoded.input_dim(), 3);
        assert_eq!(decoded.num_classes(), 2);
        assert_eq!(decoded.layer_shapes(), vec![(3, 2), (2, 2)]);

        for x in [[0.2, 0.0, 0.9], [1.0, 1.0, 0.0], [0.0, 0.3, 0.3]] {
            let a = model.predict_proba(&x).unwrap();
            let b = decoded.predict_proba(&x).unwrap();
            for (p, q) in a.iter().zip(&b) {
                assert!((p - q).abs() < 0.02, "{a:?} vs {b:?}");
            }
        }
        assert!(decoded.memory_size() < QuantizedModel::quantize(&model, QuantizationMethod::Float32).memory_size());
    }

    #[test]
    fn test_rejects_damaged_bytes() {
        let bytes = ModelExporter::default().export(&model()).unwrap();

        let mut flipped = bytes.clone();
        flipped[12] ^= 0xff;
        assert!(matches!(
            QuantizedModel::from_bytes(&flipped),
            Err(AdsieveError::CorruptArtifact(_))
        ));

        assert!(QuantizedModel::from_bytes(&bytes[..bytes.len() - 3]).is_err());
        assert!(QuantizedModel::from_bytes(b"ADQM").is_err());
    }

    #[test]
    fn test_rejects_bad_magic_with_valid_checksum() {
        let mut bytes = ModelExporter::default().export(&model()).unwrap();
        let body_len = bytes.len() - 4;
        bytes[0] = b'X';
        let crc = crc32fast::hash(&bytes[..body_len]).to_le_bytes();
        bytes[body_len..].copy_from_slice(&crc);
        let err = QuantizedModel::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("not a quantized model"));
    }

    #[test]
    fn test_method_serde() {
        assert_eq!(serde_json::to_string(&QuantizationMethod::Int8).unwrap(), "\"int8\"");
        let method: QuantizationMethod = serde_json::from_str("\"float32\"").unwrap();
        assert_eq!(method, QuantizationMethod::Float32);
    }
}
