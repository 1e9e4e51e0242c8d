use crate::common::*;

/// Identifies a base location grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridKey {
    pub height: i64,
    pub width: i64,
    pub down_ratio: i64,
    pub device: Device,
}

/// Lazily built `[2, height, width]` grids of feature cell locations in image scale.
///
/// Channel 0 holds `col * down_ratio` and channel 1 holds `row * down_ratio`.
/// A grid is built once per key, even under concurrent first access, and is
/// shared read-only afterwards.
#[derive(Debug, Default)]
pub struct BaseLocationCache {
    grids: DashMap<GridKey, Tensor>,
}

impl BaseLocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: GridKey) -> Result<Tensor> {
        let GridKey {
            height,
            width,
            down_ratio,
            ..
        } = key;
        ensure!(
            height >= 0 && width >= 0 && down_ratio > 0,
            "invalid grid key {:?}",
            key
        );

        let grid = self
            .grids
            .entry(key)
            .or_insert_with(|| {
                debug!("build base location grid for {:?}", key);
                Self::build(key)
            })
            .shallow_clone();
        Ok(grid)
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    fn build(key: GridKey) -> Tensor {
        let GridKey {
            height,
            width,
            down_ratio,
            device,
        } = key;

        let xs = (0..height).flat_map(|_| (0..width).map(move |col| (col * down_ratio) as f32));
        let ys = (0..height).flat_map(|row| (0..width).map(move |_| (row * down_ratio) as f32));
        let values: Vec<f32> = xs.chain(ys).collect();

        tch::no_grad(|| {
            Tensor::of_slice(&values)
                .view([2, height, width])
                .to_device(device)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    fn key(height: i64, width: i64, down_ratio: i64) -> GridKey {
        GridKey {
            height,
            width,
            down_ratio,
            device: Device::Cpu,
        }
    }

    #[test]
    fn base_location_values() -> Result<()> {
        let cache = BaseLocationCache::new();
        let grid = cache.get(key(3, 4, 8))?;
        assert_eq!(grid.size(), vec![2, 3, 4]);

        let xs: Vec<f32> = Vec::from(&grid.select(0, 0).contiguous().view([-1]));
        let ys: Vec<f32> = Vec::from(&grid.select(0, 1).contiguous().view([-1]));
        assert_eq!(&xs[0..4], &[0.0, 8.0, 16.0, 24.0]);
        assert_eq!(&xs[4..8], &[0.0, 8.0, 16.0, 24.0]);
        assert_eq!(&ys[0..4], &[0.0; 4]);
        assert_eq!(&ys[8..12], &[16.0; 4]);

        ensure!(cache.get(key(3, 4, 0)).is_err());
        Ok(())
    }

    #[test]
    fn base_location_is_reused_per_key() -> Result<()> {
        let cache = BaseLocationCache::new();
        let first = cache.get(key(16, 16, 4))?;
        let second = cache.get(key(16, 16, 4))?;
        assert_eq!(first.data_ptr(), second.data_ptr());
        assert_eq!(cache.len(), 1);

        let other = cache.get(key(8, 16, 4))?;
        assert_eq!(other.size(), vec![2, 8, 16]);
        assert_eq!(cache.len(), 2);
        Ok(())
    }

    #[test]
    fn base_location_concurrent_init() -> Result<()> {
        let cache = Arc::new(BaseLocationCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.get(key(32, 24, 4)).map(|grid| grid.data_ptr() as usize))
            })
            .collect();

        let ptrs: Vec<usize> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Result<_>>()?;
        ensure!(ptrs.iter().all(|&ptr| ptr == ptrs[0]));
        assert_eq!(cache.len(), 1);
        Ok(())
    }
}
