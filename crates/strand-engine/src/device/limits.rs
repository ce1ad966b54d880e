use anyhow::{bail, Result};

/// Usage class of a buffer, which decides the binding limit it must fit under.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BufferBinding {
    Storage,
    Uniform,
    /// Copy source/destination only; bounded by the plain buffer size limit.
    Transfer,
}

/// Rejects a zero-sized or over-limit buffer before it is created.
///
/// wgpu reports these as validation errors on the device timeline, where the
/// name of the offending resource is lost; checking up front keeps it.
pub fn check_buffer_size(
    limits: &wgpu::Limits,
    resource: &str,
    size: u64,
    binding: BufferBinding,
) -> Result<()> {
    if size == 0 {
        bail!("{resource}: buffer size is zero");
    }
    if size > limits.max_buffer_size {
        bail!(
            "{resource}: {size} bytes exceeds max_buffer_size ({})",
            limits.max_buffer_size
        );
    }
    let (name, limit) = match binding {
        BufferBinding::Storage => (
            "max_storage_buffer_binding_size",
            u64::from(limits.max_storage_buffer_binding_size),
        ),
        BufferBinding::Uniform => (
            "max_uniform_buffer_binding_size",
            u64::from(limits.max_uniform_buffer_binding_size),
        ),
        BufferBinding::Transfer => return Ok(()),
    };
    if size > limit {
        bail!("{resource}: {size} bytes exceeds {name} ({limit})");
    }
    Ok(())
}

/// Rejects a zero or over-limit 2D texture extent.
pub fn check_texture_extent(
    limits: &wgpu::Limits,
    resource: &str,
    width: u32,
    height: u32,
) -> Result<()> {
    if width == 0 || height == 0 {
        bail!("{resource}: texture extent {width}x{height} is empty");
    }
    let max = limits.max_texture_dimension_2d;
    if width > max || height > max {
        bail!("{resource}: texture extent {width}x{height} exceeds max_texture_dimension_2d ({max})");
    }
    Ok(())
}

/// Multiplies buffer dimensions, failing instead of wrapping.
pub fn buffer_bytes(resource: &str, factors: &[u64]) -> Result<u64> {
    factors.iter().try_fold(1u64, |acc, &f| {
        acc.checked_mul(f)
            .ok_or_else(|| anyhow::anyhow!("{resource}: size overflows u64"))
    })
}
