use crate::common::*;

pub const LEAKY_SLOPE: f64 = 0.1;

pub fn leaky_relu(xs: &Tensor, slope: f64) -> Tensor {
    xs.maximum(&(xs * slope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaky_relu_test() -> Result<()> {
        let xs = Tensor::from_slice(&[-2.0f32, -0.5, 0.0, 1.5]);
        let ys = leaky_relu(&xs, LEAKY_SLOPE);
        let ys = Vec::<f32>::try_from(&ys)?;
        let expect = [-0.2f32, -0.05, 0.0, 1.5];

        for (y, e) in ys.iter().zip(expect.iter()) {
            ensure!((y - e).abs() < 1e-6, "expect {}, but get {}", e, y);
        }
        Ok(())
    }
}
