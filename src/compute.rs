//! Compute backend selection.

use candle_core::Device;

use crate::config::DeviceSetting;

/// The candle device every tensor of a run is placed on.
///
/// Built once from the configuration and handed to the model, the batch
/// source and the evaluator.
#[derive(Debug, Clone)]
pub struct ComputeContext {
    device: Device,
}

impl ComputeContext {
    /// Host CPU context.
    pub fn cpu() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    /// Resolve a configured device, falling back to CPU with a warning when
    /// CUDA is requested but unusable.
    pub fn from_setting(setting: DeviceSetting) -> Self {
        let device = match setting {
            DeviceSetting::Cpu => Device::Cpu,
            DeviceSetting::Cuda { ordinal } if cfg!(feature = "cuda") => {
                match Device::cuda_if_available(ordinal) {
                    Ok(device @ Device::Cuda(_)) => {
                        tracing::info!("Compute device: CUDA (device {})", ordinal);
                        device
                    }
                    Ok(_) => {
                        tracing::warn!("CUDA not available; falling back to CPU");
                        Device::Cpu
                    }
                    Err(err) => {
                        tracing::warn!("CUDA init failed ({err}); falling back to CPU");
                        Device::Cpu
                    }
                }
            }
            DeviceSetting::Cuda { .. } => {
                tracing::warn!("CUDA feature disabled; falling back to CPU. Enable with --features cuda.");
                Device::Cpu
            }
        };
        Self { device }
    }

    /// The underlying device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// True when running on an accelerator.
    pub fn is_accelerator(&self) -> bool {
        !matches!(self.device, Device::Cpu)
    }
}

impl Default for ComputeContext {
    fn default() -> Self {
        Self::cpu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_context() {
        let ctx = ComputeContext::from_setting(DeviceSetting::Cpu);
        assert!(matches!(ctx.device(), Device::Cpu));
        assert!(!ctx.is_accelerator());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_falls_back_without_feature() {
        let ctx = ComputeContext::from_setting(DeviceSetting::Cuda { ordinal: 0 });
        assert!(matches!(ctx.device(), Device::Cpu));
    }
}
