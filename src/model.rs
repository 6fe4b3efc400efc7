//! BiLSTM trajectory forecaster.
//!
//! Architecture:
//!
//! ```text
//! [B, L_in, F] -> BiLSTM(H) -> [B, L_in, 2H] -> LSTM(H) -> last step [B, H]
//!              -> Linear(H, L_out * F) -> [B, L_out * F]
//! ```
//!
//! The whole horizon comes out of a single projection; there is no
//! autoregressive decoding. Parameter names follow the PyTorch layout
//! (`bilstm.weight_ih_l0`, `bilstm.weight_ih_l0_reverse`, `lstm.*`, `fc.*`).

use std::path::Path;

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::rnn::{Direction, LSTMConfig, LSTM, RNN};
use candle_nn::{Linear, Module, VarBuilder, VarMap};

use crate::config::{ModelConfig, WindowConfig};
use crate::error::{Result, ShipTrajError};

/// Anything that maps input windows to flattened forecasts.
///
/// Inputs are `[batch, input_len, features]`; outputs are
/// `[batch, horizon * features]` in the same normalized space.
pub trait Forecaster {
    /// Forecast a batch of windows.
    fn forecast(&self, inputs: &Tensor) -> Result<Tensor>;

    /// Forecast horizon in points.
    fn horizon(&self) -> usize;

    /// Channels per point.
    fn features(&self) -> usize;
}

/// The BiLSTM → LSTM → Linear baseline.
pub struct TrajectoryModel {
    bilstm_fwd: LSTM,
    bilstm_bwd: LSTM,
    lstm: LSTM,
    fc: Linear,
    window: WindowConfig,
    hidden_size: usize,
    var_map: VarMap,
    device: Device,
}

impl std::fmt::Debug for TrajectoryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrajectoryModel")
            .field("window", &self.window)
            .field("hidden_size", &self.hidden_size)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl TrajectoryModel {
    /// Create a model with freshly initialized parameters.
    pub fn new(window: WindowConfig, model: ModelConfig, device: &Device) -> Result<Self> {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);
        Self::from_varbuilder(window, model, vb, var_map, device)
    }

    fn from_varbuilder(
        window: WindowConfig,
        model: ModelConfig,
        vb: VarBuilder,
        var_map: VarMap,
        device: &Device,
    ) -> Result<Self> {
        let hidden = model.hidden_size;
        let features = window.features;

        let bilstm_fwd = candle_nn::lstm(features, hidden, LSTMConfig::default(), vb.pp("bilstm"))?;
        let bilstm_bwd = candle_nn::lstm(
            features,
            hidden,
            LSTMConfig {
                direction: Direction::Backward,
                ..Default::default()
            },
            vb.pp("bilstm"),
        )?;
        let lstm = candle_nn::lstm(2 * hidden, hidden, LSTMConfig::default(), vb.pp("lstm"))?;
        let fc = candle_nn::linear(hidden, window.horizon * features, vb.pp("fc"))?;

        Ok(Self {
            bilstm_fwd,
            bilstm_bwd,
            lstm,
            fc,
            window,
            hidden_size: hidden,
            var_map,
            device: device.clone(),
        })
    }

    /// Build a model and load its parameters from a safetensors file.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing a parameter or a tensor has the wrong
    /// shape for `window`/`model`.
    pub fn load(
        window: WindowConfig,
        model: ModelConfig,
        path: &Path,
        device: &Device,
    ) -> Result<Self> {
        let mut loaded = Self::new(window, model, device)?;
        loaded.load_weights(path)?;
        Ok(loaded)
    }

    /// Overwrite every parameter with the values stored in `path`.
    pub fn load_weights(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(ShipTrajError::checkpoint(format!(
                "weights file not found: {}",
                path.display()
            )));
        }
        self.var_map.load(path)?;
        Ok(())
    }

    /// Save parameters in safetensors format.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.var_map.save(path)?;
        Ok(())
    }

    /// Trainable parameters, for the optimizer.
    pub fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.var_map
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().elem_count())
            .sum()
    }

    /// Window geometry the model was built for.
    pub fn window(&self) -> WindowConfig {
        self.window
    }

    /// Hidden width per LSTM direction.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Device holding the parameters.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Forward pass: `[B, L_in, F]` → `[B, L_out * F]`.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (batch, steps, features) = xs.dims3()?;
        if features != self.window.features {
            return Err(ShipTrajError::shape_mismatch(
                format!("{} input features", self.window.features),
                format!("{features} input features"),
            ));
        }
        if steps == 0 {
            return Err(ShipTrajError::shape_mismatch(
                "at least one input step",
                "0 input steps",
            ));
        }

        let fwd_states = self.bilstm_fwd.seq(xs)?;
        let fwd = self.bilstm_fwd.states_to_tensor(&fwd_states)?;

        // the reverse direction walks the sequence back to front
        let mut state = self.bilstm_bwd.zero_state(batch)?;
        let mut bwd_hidden = Vec::with_capacity(steps);
        for t in (0..steps).rev() {
            let x_t = xs.i((.., t, ..))?.contiguous()?;
            state = self.bilstm_bwd.step(&x_t, &state)?;
            bwd_hidden.push(state.h().clone());
        }
        bwd_hidden.reverse();
        let bwd = Tensor::stack(&bwd_hidden, 1)?;

        let encoded = Tensor::cat(&[&fwd, &bwd], 2)?;

        let states = self.lstm.seq(&encoded)?;
        let last = states
            .last()
            .ok_or_else(|| ShipTrajError::shape_mismatch("at least one step", "0 steps"))?;

        Ok(self.fc.forward(last.h())?)
    }
}

impl Forecaster for TrajectoryModel {
    fn forecast(&self, inputs: &Tensor) -> Result<Tensor> {
        self.forward(inputs)
    }

    fn horizon(&self) -> usize {
        self.window.horizon
    }

    fn features(&self) -> usize {
        self.window.features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> (WindowConfig, ModelConfig) {
        (
            WindowConfig {
                input_len: 5,
                horizon: 3,
                features: 2,
            },
            ModelConfig { hidden_size: 4 },
        )
    }

    #[test]
    fn test_forward_shape() {
        let (window, model) = tiny();
        let net = TrajectoryModel::new(window, model, &Device::Cpu).unwrap();
        let xs = Tensor::zeros((7, 5, 2), DType::F32, &Device::Cpu).unwrap();
        let out = net.forward(&xs).unwrap();
        assert_eq!(out.dims(), &[7, 3 * 2]);
    }

    #[test]
    fn test_rejects_wrong_feature_count() {
        let (window, model) = tiny();
        let net = TrajectoryModel::new(window, model, &Device::Cpu).unwrap();
        let xs = Tensor::zeros((2, 5, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            net.forward(&xs),
            Err(ShipTrajError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_parameter_layout() {
        let (window, model) = tiny();
        let net = TrajectoryModel::new(window, model, &Device::Cpu).unwrap();

        let data = net.var_map().data().lock().unwrap();
        for name in [
            "bilstm.weight_ih_l0",
            "bilstm.weight_hh_l0",
            "bilstm.weight_ih_l0_reverse",
            "bilstm.bias_hh_l0_reverse",
            "lstm.weight_ih_l0",
            "fc.weight",
            "fc.bias",
        ] {
            assert!(data.contains_key(name), "missing parameter {name}");
        }
        assert_eq!(data["lstm.weight_ih_l0"].as_tensor().dims(), &[4 * 4, 2 * 4]);
        assert_eq!(data["fc.weight"].as_tensor().dims(), &[6, 4]);
    }

    #[test]
    fn test_parameter_count() {
        let (window, model) = tiny();
        let net = TrajectoryModel::new(window, model, &Device::Cpu).unwrap();
        let h = 4;
        let lstm = |input: usize| 4 * h * input + 4 * h * h + 8 * h;
        let expected = 2 * lstm(2) + lstm(2 * h) + (h * 6 + 6);
        assert_eq!(net.parameter_count(), expected);
    }

    #[test]
    fn test_save_and_load_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let (window, model) = tiny();

        let original = TrajectoryModel::new(window, model, &Device::Cpu).unwrap();
        original.save(&path).unwrap();

        let restored = TrajectoryModel::load(window, model, &path, &Device::Cpu).unwrap();
        let xs = Tensor::rand(0f32, 1f32, (3, 5, 2), &Device::Cpu).unwrap();
        let a = original.forward(&xs).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let b = restored.forward(&xs).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_rejects_other_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let (window, model) = tiny();
        TrajectoryModel::new(window, model, &Device::Cpu)
            .unwrap()
            .save(&path)
            .unwrap();

        let wider = ModelConfig { hidden_size: 8 };
        assert!(TrajectoryModel::load(window, wider, &path, &Device::Cpu).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let (window, model) = tiny();
        let err = TrajectoryModel::load(window, model, Path::new("/nonexistent.safetensors"), &Device::Cpu)
            .unwrap_err();
        assert!(matches!(err, ShipTrajError::Checkpoint(_)));
    }

    #[test]
    fn test_forecast_depends_on_input() {
        let (window, model) = tiny();
        let net = TrajectoryModel::new(window, model, &Device::Cpu).unwrap();
        let base = Tensor::zeros((1, 5, 2), DType::F32, &Device::Cpu).unwrap();
        let mut bumped = vec![0f32; 10];
        bumped[8] = 1.0;
        let bumped = Tensor::from_vec(bumped, (1, 5, 2), &Device::Cpu).unwrap();

        let a = net.forward(&base).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let b = net.forward(&bumped).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_ne!(a, b);
    }
}
