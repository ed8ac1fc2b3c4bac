use super::error::RingBufferError;

/// Which slot a step forward resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepReset {
    /// Reset the slot stepped into. Used by history buffers (ADC, truth) where
    /// offset 0 is the newest sample and negative offsets look into the past.
    Entered,
    /// Reset the slot stepped out of, which wraps around to the far end of the
    /// look-ahead. Used by the voltage buffer where positive offsets hold
    /// pulse contributions that have not been sampled yet.
    Vacated,
}

/// Fixed capacity circular buffer addressed relative to a moving cursor.
///
/// Valid offsets satisfy `|offset| < capacity`. Anything else is reported as
/// an error, which the pipelines treat as a causality violation.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    cursor: usize,
    reset: T,
    policy: StepReset,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize, reset: T, policy: StepReset) -> Result<Self, RingBufferError> {
        if capacity == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        Ok(Self {
            slots: vec![reset.clone(); capacity],
            cursor: 0,
            reset,
            policy,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn index(&self, offset: i64) -> Result<usize, RingBufferError> {
        let capacity = self.slots.len() as i64;
        if offset.abs() >= capacity {
            return Err(RingBufferError::OffsetOutOfRange {
                offset,
                capacity: self.slots.len(),
            });
        }
        Ok((self.cursor as i64 + offset).rem_euclid(capacity) as usize)
    }

    pub fn get(&self, offset: i64) -> Result<&T, RingBufferError> {
        let idx = self.index(offset)?;
        Ok(&self.slots[idx])
    }

    pub fn get_mut(&mut self, offset: i64) -> Result<&mut T, RingBufferError> {
        let idx = self.index(offset)?;
        Ok(&mut self.slots[idx])
    }

    pub fn set(&mut self, offset: i64, value: T) -> Result<(), RingBufferError> {
        *self.get_mut(offset)? = value;
        Ok(())
    }

    pub fn clear(&mut self, offset: i64) -> Result<(), RingBufferError> {
        let reset = self.reset.clone();
        self.set(offset, reset)
    }

    pub fn step_forward(&mut self) {
        let vacated = self.cursor;
        self.cursor = (self.cursor + 1) % self.slots.len();
        let target = match self.policy {
            StepReset::Entered => self.cursor,
            StepReset::Vacated => vacated,
        };
        self.slots[target] = self.reset.clone();
    }
}

impl RingBuffer<f64> {
    pub fn accumulate(&mut self, offset: i64, value: f64) -> Result<(), RingBufferError> {
        *self.get_mut(offset)? += value;
        Ok(())
    }
}

impl<H: Clone> RingBuffer<Vec<H>> {
    pub fn push(&mut self, offset: i64, item: H) -> Result<(), RingBufferError> {
        self.get_mut(offset)?.push(item);
        Ok(())
    }
}

/// Analog look-ahead of a channel, in volts
pub type VoltageBuffer = RingBuffer<f64>;
/// Digitized history of a channel, in ADC counts
pub type AdcBuffer = RingBuffer<i32>;
/// Truth objects that arrived in each sample period of a channel
pub type TruthBuffer<H> = RingBuffer<Vec<H>>;

pub fn voltage_buffer(capacity: usize) -> Result<VoltageBuffer, RingBufferError> {
    RingBuffer::new(capacity, 0.0, StepReset::Vacated)
}

/// ADC history pre-seeded with the channel pedestal
pub fn adc_buffer(capacity: usize, pedestal: i32) -> Result<AdcBuffer, RingBufferError> {
    RingBuffer::new(capacity, pedestal, StepReset::Entered)
}

pub fn truth_buffer<H: Clone>(capacity: usize) -> Result<TruthBuffer<H>, RingBufferError> {
    RingBuffer::new(capacity, Vec::new(), StepReset::Entered)
}
