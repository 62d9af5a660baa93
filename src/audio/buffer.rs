//! Lock-free sample ring between the playback thread and the audio callback
//!
//! The playback thread is the single producer: it converts each frame to
//! interleaved stereo `f32` and pushes it into the ring. The cpal output
//! callback is the single consumer and pops one stereo pair per output
//! frame. Nothing here ever blocks, so the callback can run on the
//! real-time audio thread without risking priority inversion.
//!
//! When the ring is empty the consumer plays silence; when it is full the
//! producer reports how much it managed to push and the sink decides how to
//! wait.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Create a ring holding `capacity` interleaved samples
pub fn sample_ring(capacity: usize) -> (SampleProducer, SampleConsumer) {
    let rb = HeapRb::<f32>::new(capacity.max(2));
    let (prod, cons) = rb.split();

    let samples_written = Arc::new(AtomicU64::new(0));
    let underruns = Arc::new(AtomicU64::new(0));

    (
        SampleProducer {
            producer: prod,
            samples_written: Arc::clone(&samples_written),
            underruns: Arc::clone(&underruns),
        },
        SampleConsumer {
            consumer: cons,
            underruns,
        },
    )
}

/// Producer half (owned by the playback thread)
pub struct SampleProducer {
    producer: ringbuf::HeapProd<f32>,
    samples_written: Arc<AtomicU64>,
    underruns: Arc<AtomicU64>,
}

impl SampleProducer {
    /// Push as many samples as fit, returning how many were taken
    #[inline]
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        let pushed = self.producer.push_slice(samples);
        self.samples_written
            .fetch_add(pushed as u64, Ordering::Relaxed);
        pushed
    }

    /// Free space in samples
    pub fn vacant_len(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Total samples pushed so far
    pub fn samples_written(&self) -> u64 {
        self.samples_written.load(Ordering::Relaxed)
    }

    /// Output frames the callback had to fill with silence
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

/// Consumer half (owned by the cpal output callback)
pub struct SampleConsumer {
    consumer: ringbuf::HeapCons<f32>,
    underruns: Arc<AtomicU64>,
}

impl SampleConsumer {
    /// Pop one interleaved stereo pair, silence if the ring ran dry.
    ///
    /// A lone sample is left in place so left and right never swap.
    #[inline]
    pub fn pop_stereo(&mut self) -> (f32, f32) {
        if self.consumer.occupied_len() >= 2 {
            if let (Some(left), Some(right)) = (self.consumer.try_pop(), self.consumer.try_pop()) {
                return (left, right);
            }
        }
        self.underruns.fetch_add(1, Ordering::Relaxed);
        (0.0, 0.0)
    }

    /// Samples waiting to be played
    pub fn occupied_len(&self) -> usize {
        self.consumer.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_consumer() {
        let (mut producer, mut consumer) = sample_ring(8);

        assert_eq!(producer.push_slice(&[0.1, 0.2, 0.3, 0.4]), 4);
        assert_eq!(consumer.occupied_len(), 4);

        assert_eq!(consumer.pop_stereo(), (0.1, 0.2));
        assert_eq!(consumer.pop_stereo(), (0.3, 0.4));
        assert_eq!(producer.samples_written(), 4);
    }

    #[test]
    fn test_push_stops_when_full() {
        let (mut producer, mut consumer) = sample_ring(4);

        assert_eq!(producer.push_slice(&[1.0; 6]), 4);
        assert_eq!(producer.vacant_len(), 0);

        consumer.pop_stereo();
        assert_eq!(producer.vacant_len(), 2);
        assert_eq!(producer.push_slice(&[2.0; 6]), 2);
    }

    #[test]
    fn test_lone_sample_waits_for_its_pair() {
        let (mut producer, mut consumer) = sample_ring(3);

        producer.push_slice(&[0.1, 0.2, 0.3]);
        assert_eq!(consumer.pop_stereo(), (0.1, 0.2));
        assert_eq!(consumer.pop_stereo(), (0.0, 0.0));
        assert_eq!(consumer.occupied_len(), 1);
        assert_eq!(producer.underruns(), 1);

        producer.push_slice(&[0.4, 0.5]);
        assert_eq!(consumer.pop_stereo(), (0.3, 0.4));
    }

    #[test]
    fn test_empty_ring_plays_silence() {
        let (producer, mut consumer) = sample_ring(4);

        assert_eq!(consumer.pop_stereo(), (0.0, 0.0));
        assert_eq!(consumer.pop_stereo(), (0.0, 0.0));
        assert_eq!(producer.underruns(), 2);
    }
}
