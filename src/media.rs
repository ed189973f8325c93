// media.rs - background decoding of still images and frame sequences, and
// the texture updater that feeds them to the renderer

use image::io::Reader as ImageReader;
use image::RgbaImage;
use log::{debug, error, info, warn};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::renderer::{EyeRenderer, RenderError};
use crate::viewer::MediaStatus;

/// Decoded frames buffered between the player thread and the updater.
const STREAM_BUFFER: usize = 2;

const FRAME_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "tga"];

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no image frames found in {0}")]
    EmptySequence(PathBuf),
}

/// A live stream: the first decoded frame plus a channel of later ones.
pub struct FrameStream {
    pub first: RgbaImage,
    pub frames: Receiver<RgbaImage>,
}

pub enum MediaSource {
    Image(RgbaImage),
    Stream(FrameStream),
}

/// Decodes one image, guessing the format from its content, without size limits.
pub fn decode_image(path: &Path) -> Result<RgbaImage, MediaError> {
    let file = File::open(path).map_err(|source| MediaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decode_error = |source| MediaError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(|e| decode_error(image::ImageError::IoError(e)))?;
    reader.no_limits();
    let image = reader.decode().map_err(decode_error)?;
    Ok(image.to_rgba8())
}

pub fn spawn_image_loader(path: PathBuf, tx: Sender<MediaSource>) -> JoinHandle<()> {
    thread::spawn(move || {
        info!("Loading image {:?}", path);
        match decode_image(&path) {
            Ok(image) => {
                info!("Decoded {}x{} image", image.width(), image.height());
                if tx.send(MediaSource::Image(image)).is_err() {
                    debug!("viewer went away before {:?} finished loading", path);
                }
            }
            Err(e) => error!("{e}"),
        }
    })
}

/// Trailing number of a file stem, e.g. `frame_0042.png` -> 42.
fn frame_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

/// Image files of a directory in playback order: by trailing frame number,
/// then by name.
pub fn sequence_frames(dir: &Path) -> Result<Vec<PathBuf>, MediaError> {
    let entries = fs::read_dir(dir).map_err(|source| MediaError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut frames: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    if frames.is_empty() {
        return Err(MediaError::EmptySequence(dir.to_path_buf()));
    }
    frames.sort_by(|a, b| (frame_number(a), a).cmp(&(frame_number(b), b)));
    Ok(frames)
}

/// Plays a directory of numbered frames as a live source. The stream is sent
/// once the first frame decodes; later frames follow at `fps` through a
/// bounded channel. The thread stops when the receiver is dropped, or at the
/// end of the sequence unless `looping`.
pub fn spawn_sequence_player(dir: PathBuf, fps: f32, looping: bool, tx: Sender<MediaSource>) -> JoinHandle<()> {
    thread::spawn(move || {
        let frames = match sequence_frames(&dir) {
            Ok(frames) => frames,
            Err(e) => {
                error!("{e}");
                return;
            }
        };
        info!("Playing {} frames from {:?} at {} fps", frames.len(), dir, fps);

        let first = match decode_image(&frames[0]) {
            Ok(image) => image,
            Err(e) => {
                error!("{e}");
                return;
            }
        };
        let (frame_tx, frame_rx) = sync_channel(STREAM_BUFFER);
        if tx
            .send(MediaSource::Stream(FrameStream {
                first,
                frames: frame_rx,
            }))
            .is_err()
        {
            return;
        }

        let interval = Duration::from_secs_f32(1.0 / fps.max(0.001));
        let mut next_due = Instant::now() + interval;
        let mut index = 1;
        let mut decoded_this_pass = 1usize;

        loop {
            if index >= frames.len() {
                if !looping || decoded_this_pass == 0 {
                    break;
                }
                index = 0;
                decoded_this_pass = 0;
            }

            let frame = match decode_image(&frames[index]) {
                Ok(image) => image,
                Err(e) => {
                    warn!("Skipping frame: {e}");
                    index += 1;
                    continue;
                }
            };
            index += 1;
            decoded_this_pass += 1;

            let now = Instant::now();
            if next_due > now {
                thread::sleep(next_due - now);
            }
            next_due += interval;

            if frame_tx.send(frame).is_err() {
                debug!("Frame stream for {:?} dropped by the viewer", dir);
                return;
            }
        }
        info!("Frame sequence {:?} finished", dir);
    })
}

enum Installed {
    Image,
    Stream { frames: Receiver<RgbaImage>, ended: bool },
}

/// Owns the link between a media source and the renderer's texture.
#[derive(Default)]
pub struct TextureUpdater {
    installed: Option<Installed>,
    size: (u32, u32),
    frames_uploaded: u64,
    rejected: u64,
}

impl TextureUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a texture for the source's first image. Static images get
    /// a mip chain; streams a single level.
    pub fn install<R: EyeRenderer + ?Sized>(&mut self, source: MediaSource, renderer: &mut R) -> Result<(), RenderError> {
        match source {
            MediaSource::Image(image) => {
                self.size = renderer.allocate_texture(&image, true)?;
                self.installed = Some(Installed::Image);
            }
            MediaSource::Stream(stream) => {
                self.size = renderer.allocate_texture(&stream.first, false)?;
                self.installed = Some(Installed::Stream {
                    frames: stream.frames,
                    ended: false,
                });
            }
        }
        self.frames_uploaded = 1;
        self.rejected = 0;
        Ok(())
    }

    /// Uploads the newest pending stream frame, dropping older ones.
    /// Returns true when the texture changed.
    pub fn refresh<R: EyeRenderer + ?Sized>(&mut self, renderer: &mut R) -> bool {
        let Some(Installed::Stream { frames, ended }) = self.installed.as_mut() else {
            return false;
        };
        if *ended {
            return false;
        }

        let mut newest = None;
        loop {
            match frames.try_recv() {
                Ok(frame) => newest = Some(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("Stream ended; keeping the last frame");
                    *ended = true;
                    break;
                }
            }
        }

        let Some(frame) = newest else {
            return false;
        };
        match renderer.update_texture(&frame) {
            Ok(()) => {
                self.frames_uploaded += 1;
                true
            }
            Err(e) => {
                self.rejected += 1;
                warn!("Dropping stream frame: {e}");
                false
            }
        }
    }

    pub fn frames_uploaded(&self) -> u64 {
        self.frames_uploaded
    }

    pub fn rejected_frames(&self) -> u64 {
        self.rejected
    }

    pub fn status(&self) -> MediaStatus {
        let (width, height) = self.size;
        match &self.installed {
            None => MediaStatus::Empty,
            Some(Installed::Image) => MediaStatus::Image { width, height },
            Some(Installed::Stream { ended, .. }) => MediaStatus::Stream {
                width,
                height,
                frames: self.frames_uploaded,
                ended: *ended,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::CubeMesh;
    use crate::renderer::check_texture_size;
    use crate::view::EyeView;
    use crate::viewer::ViewerStatus;
    use image::Rgba;

    #[derive(Default)]
    struct TextureLog {
        allocations: Vec<((u32, u32), bool)>,
        updates: Vec<Rgba<u8>>,
        size: (u32, u32),
        max_dimension: Option<u32>,
    }

    impl EyeRenderer for TextureLog {
        fn upload_mesh(&mut self, _mesh: &CubeMesh) {}

        fn allocate_texture(&mut self, image: &RgbaImage, mipmapped: bool) -> Result<(u32, u32), RenderError> {
            if let Some(max) = self.max_dimension {
                check_texture_size(image.dimensions(), max)?;
            }
            self.size = image.dimensions();
            self.allocations.push((self.size, mipmapped));
            Ok(self.size)
        }

        fn update_texture(&mut self, image: &RgbaImage) -> Result<(), RenderError> {
            if image.dimensions() != self.size {
                return Err(RenderError::SizeMismatch {
                    expected: self.size,
                    actual: image.dimensions(),
                });
            }
            self.updates.push(*image.get_pixel(0, 0));
            Ok(())
        }

        fn target_size(&self) -> (u32, u32) {
            (1, 1)
        }

        fn resize_target(&mut self, _size: (u32, u32)) {}

        fn begin_frame(&mut self) -> Result<(), RenderError> {
            Ok(())
        }

        fn draw_eye(&mut self, _eye: &EyeView, _atlas_scale: [f32; 2]) {}

        fn end_frame(&mut self, _status: &ViewerStatus) -> Result<(), RenderError> {
            Ok(())
        }

        fn release(&mut self) {}
    }

    fn solid(width: u32, height: u32, shade: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([shade, shade, shade, 255]))
    }

    #[test]
    fn static_image_is_mipmapped_and_never_refreshed() {
        let mut renderer = TextureLog::default();
        let mut updater = TextureUpdater::new();
        updater
            .install(MediaSource::Image(solid(6, 4, 1)), &mut renderer)
            .unwrap();
        assert_eq!(renderer.allocations, vec![((6, 4), true)]);
        assert!(!updater.refresh(&mut renderer));
        assert!(renderer.updates.is_empty());
        assert_eq!(updater.status(), MediaStatus::Image { width: 6, height: 4 });
    }

    #[test]
    fn stream_uploads_only_the_newest_frame() {
        let (tx, rx) = sync_channel(4);
        let mut renderer = TextureLog::default();
        let mut updater = TextureUpdater::new();
        updater
            .install(
                MediaSource::Stream(FrameStream {
                    first: solid(6, 4, 0),
                    frames: rx,
                }),
                &mut renderer,
            )
            .unwrap();
        assert_eq!(renderer.allocations, vec![((6, 4), false)]);

        tx.send(solid(6, 4, 1)).unwrap();
        tx.send(solid(6, 4, 2)).unwrap();
        assert!(updater.refresh(&mut renderer));
        assert_eq!(renderer.updates, vec![Rgba([2, 2, 2, 255])]);
        assert!(!updater.refresh(&mut renderer), "nothing new");
        // No reallocation while streaming.
        assert_eq!(renderer.allocations.len(), 1);
    }

    #[test]
    fn mismatched_frame_is_skipped() {
        let (tx, rx) = sync_channel(4);
        let mut renderer = TextureLog::default();
        let mut updater = TextureUpdater::new();
        updater
            .install(
                MediaSource::Stream(FrameStream {
                    first: solid(6, 4, 0),
                    frames: rx,
                }),
                &mut renderer,
            )
            .unwrap();

        tx.send(solid(8, 4, 1)).unwrap();
        assert!(!updater.refresh(&mut renderer));
        assert_eq!(updater.rejected_frames(), 1);

        tx.send(solid(6, 4, 3)).unwrap();
        assert!(updater.refresh(&mut renderer));
        assert_eq!(renderer.updates, vec![Rgba([3, 3, 3, 255])]);
    }

    #[test]
    fn stream_over_the_texture_limit_is_not_installed() {
        let (tx, rx) = sync_channel(4);
        let mut renderer = TextureLog {
            max_dimension: Some(8),
            ..Default::default()
        };
        let mut updater = TextureUpdater::new();
        let result = updater.install(
            MediaSource::Stream(FrameStream {
                first: solid(12, 2, 0),
                frames: rx,
            }),
            &mut renderer,
        );
        assert!(matches!(
            result,
            Err(RenderError::TextureTooLarge { size: (12, 2), max: 8 })
        ));
        assert!(renderer.allocations.is_empty());
        assert_eq!(updater.status(), MediaStatus::Empty);

        tx.send(solid(12, 2, 1)).unwrap();
        assert!(!updater.refresh(&mut renderer));
        assert!(renderer.updates.is_empty());
    }

    #[test]
    fn closed_stream_keeps_last_frame() {
        let (tx, rx) = sync_channel(4);
        let mut renderer = TextureLog::default();
        let mut updater = TextureUpdater::new();
        updater
            .install(
                MediaSource::Stream(FrameStream {
                    first: solid(2, 2, 0),
                    frames: rx,
                }),
                &mut renderer,
            )
            .unwrap();
        tx.send(solid(2, 2, 9)).unwrap();
        drop(tx);
        assert!(updater.refresh(&mut renderer));
        assert!(matches!(updater.status(), MediaStatus::Stream { ended: true, frames: 2, .. }));
        assert!(!updater.refresh(&mut renderer));
    }

    #[test]
    fn frames_sort_by_number() {
        let mut paths = vec![
            PathBuf::from("f10.png"),
            PathBuf::from("f2.png"),
            PathBuf::from("f1.png"),
        ];
        paths.sort_by(|a, b| (frame_number(a), a).cmp(&(frame_number(b), b)));
        assert_eq!(paths[0], PathBuf::from("f1.png"));
        assert_eq!(paths[2], PathBuf::from("f10.png"));
        assert_eq!(frame_number(Path::new("cube.png")), None);
    }

    #[test]
    fn sequence_player_streams_frames_from_a_directory() {
        let dir = std::env::temp_dir().join(format!("cubemap_viewer_seq_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for i in 0..3u8 {
            solid(6, 4, i * 10).save(dir.join(format!("frame_{i:03}.png"))).unwrap();
        }
        fs::write(dir.join("notes.txt"), "not a frame").unwrap();
        assert_eq!(sequence_frames(&dir).unwrap().len(), 3);

        let (tx, rx) = std::sync::mpsc::channel();
        let player = spawn_sequence_player(dir.clone(), 200.0, false, tx);
        let Ok(MediaSource::Stream(stream)) = rx.recv() else {
            panic!("expected a stream");
        };
        assert_eq!(stream.first.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        let rest: Vec<_> = stream.frames.iter().map(|f| f.get_pixel(0, 0)[0]).collect();
        assert_eq!(rest, vec![10, 20]);
        player.join().unwrap();

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_reports_io_error() {
        assert!(matches!(
            decode_image(Path::new("/nonexistent/cube.png")),
            Err(MediaError::Io { .. })
        ));
        assert!(matches!(
            sequence_frames(Path::new("/nonexistent/frames")),
            Err(MediaError::Io { .. })
        ));
    }
}
