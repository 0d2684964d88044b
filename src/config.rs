use std::time::Duration;

use crate::error::Error;

/// Whether a socket is tuned for request latency or bulk throughput.
///
/// The mapping to `TCP_NODELAY`: [`Optimization::Latency`] disables
/// Nagle's algorithm (`TCP_NODELAY = true`); [`Optimization::Throughput`]
/// leaves Nagle on so small writes coalesce into full segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Optimization {
    /// Flush every write immediately.
    #[default]
    Latency,
    /// Let the kernel coalesce small writes.
    Throughput,
}

/// Per-socket tuning knobs, shared by servers and clients.
#[derive(Debug, Clone, Copy)]
pub struct SocketOpts {
    /// Latency/throughput trade-off; controls `TCP_NODELAY`.
    pub optimization: Optimization,
    /// Initial capacity of the per-connection read buffer. Each read is
    /// guaranteed at least a fifth of this as spare capacity.
    pub read_buf_size: usize,
    /// `SO_RCVBUF` in bytes. 0 = kernel default.
    pub tcp_read_window_size: usize,
    /// `SO_SNDBUF` in bytes. 0 = kernel default.
    pub tcp_write_window_size: usize,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            optimization: Optimization::Latency,
            read_buf_size: 64 * 1024,
            tcp_read_window_size: 0,
            tcp_write_window_size: 0,
        }
    }
}

impl SocketOpts {
    /// Validate option values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.read_buf_size == 0 {
            return Err(Error::InvalidConfiguration(
                "read_buf_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Options for a [`Batcher`](crate::batcher::Batcher).
///
/// The batcher pre-allocates `1 + queue_size / batch_size` back-buffers of
/// `batch_size` items each; producers block only when every back-buffer is
/// full and unconsumed.
#[derive(Debug, Clone, Copy)]
pub struct BatcherOpts {
    /// Items per delivered batch. Must be > 0.
    pub batch_size: usize,
    /// Items the batcher may hold beyond the current back-buffer. Must be
    /// > 0 and a multiple of `batch_size`.
    pub queue_size: usize,
    /// Maximum time a partial batch may wait before being flushed.
    pub window: Duration,
}

impl BatcherOpts {
    /// Options with the given batch size and the defaults for the rest:
    /// `queue_size = 2 * batch_size`, `window = 25ms`.
    pub fn new(batch_size: usize) -> Self {
        BatcherOpts {
            batch_size,
            queue_size: 2 * batch_size,
            window: Duration::from_millis(25),
        }
    }

    /// Set the queue size.
    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Set the flush window.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Validate option values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfiguration("batch_size must be > 0".into()));
        }
        if self.queue_size == 0 {
            return Err(Error::InvalidConfiguration("queue_size must be > 0".into()));
        }
        if self.queue_size % self.batch_size != 0 {
            return Err(Error::InvalidConfiguration(format!(
                "queue_size {} must be a multiple of batch_size {}",
                self.queue_size, self.batch_size
            )));
        }
        if self.window.is_zero() {
            return Err(Error::InvalidConfiguration("window must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batcher_defaults() {
        let opts = BatcherOpts::new(100);
        assert_eq!(opts.queue_size, 200);
        assert_eq!(opts.window, Duration::from_millis(25));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn queue_size_must_be_multiple_of_batch_size() {
        let opts = BatcherOpts::new(10).queue_size(15);
        assert!(matches!(
            opts.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn zero_values_rejected() {
        assert!(BatcherOpts::new(0).validate().is_err());
        assert!(BatcherOpts::new(4).queue_size(0).validate().is_err());
        assert!(
            BatcherOpts::new(4)
                .window(Duration::ZERO)
                .validate()
                .is_err()
        );
        let socket = SocketOpts {
            read_buf_size: 0,
            ..SocketOpts::default()
        };
        assert!(socket.validate().is_err());
    }
}
