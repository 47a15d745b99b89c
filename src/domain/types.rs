use num::complex::Complex64;

/// One complex reflection/transmission sample at a frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datapoint {
    pub freq: u64,
    pub re: f64,
    pub im: f64,
}

impl Datapoint {
    pub fn new(freq: u64, re: f64, im: f64) -> Self {
        Datapoint { freq, re, im }
    }

    pub fn from_complex(freq: u64, z: Complex64) -> Self {
        Datapoint {
            freq,
            re: z.re,
            im: z.im,
        }
    }

    pub fn z(&self) -> Complex64 {
        Complex64::new(self.re, self.im)
    }
}

/// Full-span results of a sweep, S11 and S21, corrected and raw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepData {
    pub data11: Vec<Datapoint>,
    pub data21: Vec<Datapoint>,
    pub raw11: Vec<Datapoint>,
    pub raw21: Vec<Datapoint>,
}

impl SweepData {
    pub fn len(&self) -> usize {
        self.data11.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data11.is_empty()
    }
}
