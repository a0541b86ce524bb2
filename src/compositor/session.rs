//! # 会话层（显式状态）
//!
//! ## 设计思路
//!
//! 使用 `Session` 持有一次使用过程中的全部状态，替代页面脚本里的全局画布、全局图片句柄：
//! 1. 模板位图：启动时并行加载一次，之后每次生成复用
//! 2. 当前头像：每次选择文件整体替换，从不原地修改
//! 3. 渲染目标：按 `Variant` 复用，每次合成前整体清空；缩放后的模板随目标缓存
//!
//! ## 实现思路
//!
//! - “模板就绪”“头像已解码”两个信号使用 `tokio::sync::watch` 表达，
//!   `wait_until_ready` 对二者做 join，替代嵌套的 onload 回调。
//! - 每次选择头像领取递增的 `PhotoTicket`；解码完成时若已有更新的选择，
//!   结果直接丢弃（以最新选择为准），避免旧结果覆盖新结果。
//! - 单次合成期间持有渲染目标锁，保证同一目标不会被并发绘制。

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use image::RgbaImage;
use image::imageops::FilterType;
use tokio::sync::watch;

use super::export::{encode_png, export_file_name};
use super::render::{RenderStyle, render, scale_template};
use super::text::FontFace;
use super::{
    CompositorConfig, DecodedImage, FrameHandler, ImageError, ImageSource, Preset, RenderTarget,
    Resolution, TemplateKind, Variant,
};

/// 一次头像选择的序号凭证。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoTicket(u64);

impl PhotoTicket {
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// 头像解码结果的提交结论。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoUpdate {
    /// 已成为当前头像。
    Applied,
    /// 期间出现了更新的选择，结果被丢弃。
    Discarded,
}

#[derive(Default)]
struct TemplateSet {
    vertical: Option<Arc<RgbaImage>>,
    square: Option<Arc<RgbaImage>>,
}

impl TemplateSet {
    fn get(&self, kind: TemplateKind) -> Option<&Arc<RgbaImage>> {
        match kind {
            TemplateKind::Vertical => self.vertical.as_ref(),
            TemplateKind::Square => self.square.as_ref(),
        }
    }

    fn set(&mut self, kind: TemplateKind, image: Arc<RgbaImage>) {
        match kind {
            TemplateKind::Vertical => self.vertical = Some(image),
            TemplateKind::Square => self.square = Some(image),
        }
    }
}

#[derive(Default)]
struct PhotoSlot {
    generation: u64,
    image: Option<Arc<RgbaImage>>,
}

/// 按 `Variant` 复用的画布与已缩放模板。
struct RenderSlot {
    target: RenderTarget,
    background: RgbaImage,
    filter: FilterType,
}

/// 单个渲染结果。
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub variant: Variant,
    pub image: RgbaImage,
    /// 高清为下载文件名，预览为 `preview_<story|post>.png`。
    pub file_name: String,
}

impl RenderedFrame {
    pub fn encode_png(&self) -> Result<Vec<u8>, ImageError> {
        encode_png(&self.image)
    }
}

/// 一次生成动作的全部输出。
#[derive(Debug, Clone)]
pub struct GeneratedFrames {
    pub frames: Vec<RenderedFrame>,
}

impl GeneratedFrames {
    pub fn get(&self, template: TemplateKind, resolution: Resolution) -> Option<&RenderedFrame> {
        self.frames
            .iter()
            .find(|f| f.variant.template == template && f.variant.resolution == resolution)
    }

    pub fn previews(&self) -> impl Iterator<Item = &RenderedFrame> {
        self.frames
            .iter()
            .filter(|f| f.variant.resolution == Resolution::Preview)
    }

    pub fn exports(&self) -> impl Iterator<Item = &RenderedFrame> {
        self.frames
            .iter()
            .filter(|f| f.variant.resolution == Resolution::Full)
    }
}

/// 合成会话。
pub struct Session {
    preset: Preset,
    handler: FrameHandler,
    font: Option<FontFace>,
    templates: RwLock<TemplateSet>,
    templates_ready: watch::Sender<bool>,
    latest_selection: AtomicU64,
    photo: Mutex<PhotoSlot>,
    photo_ready: watch::Sender<Option<u64>>,
    targets: Mutex<HashMap<Variant, RenderSlot>>,
}

impl Session {
    /// 创建会话。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use profile_frame::compositor::{CompositorConfig, ImageSource, Preset, Session};
    ///
    /// # async fn demo() -> Result<(), profile_frame::compositor::ImageError> {
    /// let session = Session::new(Preset::Bordered, CompositorConfig::default(), None)?;
    /// session
    ///     .load_templates(
    ///         Some(ImageSource::parse("template.png")),
    ///         Some(ImageSource::parse("template-square.png")),
    ///     )
    ///     .await?;
    /// session.select_photo(ImageSource::parse("me.jpg")).await?;
    /// let frames = session.generate_when_ready(None).await?;
    /// assert_eq!(frames.exports().count(), 2);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        preset: Preset,
        config: CompositorConfig,
        font: Option<FontFace>,
    ) -> Result<Self, ImageError> {
        let (templates_ready, _) = watch::channel(false);
        let (photo_ready, _) = watch::channel(None);

        Ok(Self {
            preset,
            handler: FrameHandler::new(config)?,
            font,
            templates: RwLock::new(TemplateSet::default()),
            templates_ready,
            latest_selection: AtomicU64::new(0),
            photo: Mutex::new(PhotoSlot::default()),
            photo_ready,
            targets: Mutex::new(HashMap::new()),
        })
    }

    pub fn preset(&self) -> Preset {
        self.preset
    }

    pub fn handler(&self) -> &FrameHandler {
        &self.handler
    }

    pub fn templates_ready(&self) -> bool {
        *self.templates_ready.borrow()
    }

    pub fn has_photo(&self) -> bool {
        self.photo_ready.borrow().is_some()
    }

    /// 并行加载预设所需的模板，只加载一次。
    ///
    /// 任一模板失败时会话保持“未就绪”，不自动重试。
    pub async fn load_templates(
        &self,
        vertical: Option<ImageSource>,
        square: Option<ImageSource>,
    ) -> Result<(), ImageError> {
        if self.templates_ready() {
            log::debug!("♻️ 模板已就绪，跳过重复加载");
            return Ok(());
        }

        let required = self.preset.templates();
        let pick = |kind: TemplateKind, source: Option<ImageSource>| {
            if required.contains(&kind) { source } else { None }
        };
        let vertical = pick(TemplateKind::Vertical, vertical);
        let square = pick(TemplateKind::Square, square);

        for &kind in required {
            let provided = match kind {
                TemplateKind::Vertical => vertical.is_some(),
                TemplateKind::Square => square.is_some(),
            };
            if !provided {
                return Err(ImageError::TemplateUnavailable(format!(
                    "预设 {} 缺少 {} 模板来源",
                    self.preset,
                    kind.as_str()
                )));
            }
        }

        let started = Instant::now();
        let (vertical, square) = tokio::try_join!(
            self.load_template(TemplateKind::Vertical, vertical),
            self.load_template(TemplateKind::Square, square),
        )
        .inspect_err(|err| log::error!("❌ 模板加载失败，生成功能保持不可用: {err}"))?;

        {
            let mut templates = self
                .templates
                .write()
                .map_err(|_| ImageError::Internal("模板写入锁已中毒".to_string()))?;
            if let Some(image) = vertical {
                templates.set(TemplateKind::Vertical, image.image);
            }
            if let Some(image) = square {
                templates.set(TemplateKind::Square, image.image);
            }
        }

        self.templates_ready.send_replace(true);
        log::info!(
            "🖼️ 模板就绪 - 预设: {} 耗时: {}ms",
            self.preset,
            started.elapsed().as_millis()
        );
        Ok(())
    }

    async fn load_template(
        &self,
        kind: TemplateKind,
        source: Option<ImageSource>,
    ) -> Result<Option<DecodedImage>, ImageError> {
        let Some(source) = source else {
            return Ok(None);
        };
        log::debug!("📥 加载 {} 模板: {}", kind.as_str(), source.describe());
        self.handler.load_image(source).await.map(Some)
    }

    /// 开始一次新的头像选择，之前未完成的选择随之作废。
    pub fn begin_photo_selection(&self) -> PhotoTicket {
        PhotoTicket(self.latest_selection.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// 选择头像：加载 → 校验 → 解码 → 提交。
    ///
    /// 校验失败时清空当前头像（等价于清空文件输入框），不会触发合成。
    pub async fn select_photo(&self, source: ImageSource) -> Result<PhotoUpdate, ImageError> {
        let ticket = self.begin_photo_selection();
        let strict = self.preset.validates_uploads();

        match self.handler.load_upload(source, strict).await {
            Ok(decoded) => self.commit_photo(ticket, decoded),
            Err(err) => {
                log::warn!("⚠️ 头像被拒绝（选择 #{}）: {}", ticket.0, err);
                self.reject_photo(ticket)?;
                Err(err)
            }
        }
    }

    /// 提交解码结果；若凭证不是最新选择则丢弃。
    pub fn commit_photo(
        &self,
        ticket: PhotoTicket,
        photo: DecodedImage,
    ) -> Result<PhotoUpdate, ImageError> {
        let mut slot = self
            .photo
            .lock()
            .map_err(|_| ImageError::Internal("头像锁已中毒".to_string()))?;

        let latest = self.latest_selection.load(Ordering::SeqCst);
        if ticket.0 != latest || ticket.0 <= slot.generation {
            log::warn!(
                "⏭️ 丢弃过期的头像解码结果（选择 #{}，最新 #{}）",
                ticket.0,
                latest
            );
            return Ok(PhotoUpdate::Discarded);
        }

        slot.generation = ticket.0;
        slot.image = Some(photo.image);
        self.photo_ready.send_replace(Some(ticket.0));

        log::info!("👤 头像已更新（选择 #{}）", ticket.0);
        Ok(PhotoUpdate::Applied)
    }

    fn reject_photo(&self, ticket: PhotoTicket) -> Result<(), ImageError> {
        let mut slot = self
            .photo
            .lock()
            .map_err(|_| ImageError::Internal("头像锁已中毒".to_string()))?;

        if ticket.0 == self.latest_selection.load(Ordering::SeqCst) {
            slot.generation = ticket.0;
            slot.image = None;
            self.photo_ready.send_replace(None);
        }
        Ok(())
    }

    /// 等待“模板就绪”与“头像已解码”两个信号同时成立。
    pub async fn wait_until_ready(&self) -> Result<(), ImageError> {
        let mut templates = self.templates_ready.subscribe();
        let mut photo = self.photo_ready.subscribe();

        tokio::try_join!(
            async {
                templates
                    .wait_for(|ready| *ready)
                    .await
                    .map(|_| ())
                    .map_err(|_| ImageError::TemplateUnavailable("模板信号已关闭".to_string()))
            },
            async {
                photo
                    .wait_for(|generation| generation.is_some())
                    .await
                    .map(|_| ())
                    .map_err(|_| ImageError::MissingInput("头像信号已关闭".to_string()))
            },
        )?;

        Ok(())
    }

    /// 带超时的就绪等待，超时按缺失的一方报错。
    pub async fn wait_until_ready_timeout(&self, timeout: Duration) -> Result<(), ImageError> {
        match tokio::time::timeout(timeout, self.wait_until_ready()).await {
            Ok(result) => result,
            Err(_) if !self.templates_ready() => Err(ImageError::TemplateUnavailable(format!(
                "模板在 {}ms 内未就绪",
                timeout.as_millis()
            ))),
            Err(_) => Err(ImageError::MissingInput(format!(
                "头像在 {}ms 内未就绪",
                timeout.as_millis()
            ))),
        }
    }

    /// 等待就绪后生成。
    pub async fn generate_when_ready(&self, name: Option<&str>) -> Result<GeneratedFrames, ImageError> {
        self.wait_until_ready().await?;
        self.generate(name)
    }

    /// 为预设中的每个模板生成预览与高清两张图。
    pub fn generate(&self, name: Option<&str>) -> Result<GeneratedFrames, ImageError> {
        if !self.templates_ready() {
            return Err(ImageError::TemplateUnavailable(
                "背景模板尚未加载完成".to_string(),
            ));
        }

        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let photo = self
            .photo
            .lock()
            .map_err(|_| ImageError::Internal("头像锁已中毒".to_string()))?
            .image
            .clone();

        let name_missing = self.preset.requires_name() && name.is_none();
        let photo = match (photo, name_missing) {
            (None, true) => {
                return Err(ImageError::MissingInput("请输入姓名并上传头像图片".to_string()));
            }
            (None, false) => return Err(ImageError::MissingInput("请上传头像图片".to_string())),
            (Some(_), true) => return Err(ImageError::MissingInput("请输入姓名".to_string())),
            (Some(photo), false) => photo,
        };

        let started = Instant::now();
        let config = self.handler.config_snapshot()?;
        let style = RenderStyle {
            filter: config.resize_filter,
            name_color: config.name_rgba()?,
            border_color: config.border_rgba()?,
            font: self.font.as_deref(),
        };

        let templates = self
            .templates
            .read()
            .map_err(|_| ImageError::Internal("模板读取锁已中毒".to_string()))?;
        let mut targets = self
            .targets
            .lock()
            .map_err(|_| ImageError::Internal("渲染目标锁已中毒".to_string()))?;

        let mut frames = Vec::new();
        for &kind in self.preset.templates() {
            let template = templates.get(kind).ok_or_else(|| {
                ImageError::TemplateUnavailable(format!("{} 模板缺失", kind.as_str()))
            })?;

            for resolution in Resolution::ALL {
                let variant = Variant::new(self.preset, kind, resolution);
                let placement = variant.placement()?;
                let slot = match targets.entry(variant) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => entry.insert(RenderSlot {
                        target: RenderTarget::new(placement.width, placement.height),
                        background: scale_template(
                            template,
                            placement.width,
                            placement.height,
                            style.filter,
                        )?,
                        filter: style.filter,
                    }),
                };
                if slot.filter != style.filter {
                    log::debug!("♻️ 平滑档位变化，重新缩放 {} 模板", kind.as_str());
                    slot.background =
                        scale_template(template, placement.width, placement.height, style.filter)?;
                    slot.filter = style.filter;
                }

                render(&mut slot.target, &placement, &slot.background, &photo, name, &style)?;

                let file_name = match resolution {
                    Resolution::Full => export_file_name(self.preset, kind, name),
                    Resolution::Preview => format!("preview_{}.png", kind.export_suffix()),
                };

                frames.push(RenderedFrame {
                    variant,
                    image: slot.target.snapshot(),
                    file_name,
                });
            }
        }

        log::info!(
            "✅ 生成完成 - 预设: {} 输出: {} 张 耗时: {}ms",
            self.preset,
            frames.len(),
            started.elapsed().as_millis()
        );

        Ok(GeneratedFrames { frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::UploadedFile;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, 90, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    fn upload(name: &str, width: u32, height: u32) -> ImageSource {
        ImageSource::Upload(UploadedFile {
            name: name.to_string(),
            declared_mime: Some("image/png".to_string()),
            bytes: create_png_bytes(width, height),
        })
    }

    fn decoded(width: u32, height: u32, shade: u8) -> DecodedImage {
        DecodedImage::new(RgbaImage::from_pixel(width, height, Rgba([shade, shade, shade, 255])))
    }

    async fn ready_bordered_session() -> Session {
        let session = Session::new(Preset::Bordered, CompositorConfig::default(), None)
            .expect("session init failed");
        session
            .load_templates(Some(upload("v.png", 54, 96)), Some(upload("s.png", 54, 54)))
            .await
            .expect("templates should load");
        session
    }

    #[test]
    fn stale_decode_is_discarded() {
        let session = Session::new(Preset::Bordered, CompositorConfig::default(), None)
            .expect("session init failed");

        let first = session.begin_photo_selection();
        let second = session.begin_photo_selection();

        assert_eq!(
            session.commit_photo(second, decoded(10, 10, 1)).unwrap(),
            PhotoUpdate::Applied
        );
        assert_eq!(
            session.commit_photo(first, decoded(10, 10, 2)).unwrap(),
            PhotoUpdate::Discarded
        );

        let slot = session.photo.lock().unwrap();
        assert_eq!(slot.generation, second.generation());
        assert_eq!(slot.image.as_ref().unwrap().get_pixel(0, 0).0[0], 1);
    }

    #[test]
    fn older_result_arriving_first_is_still_discarded() {
        let session = Session::new(Preset::Bordered, CompositorConfig::default(), None)
            .expect("session init failed");

        let first = session.begin_photo_selection();
        let _second = session.begin_photo_selection();

        assert_eq!(
            session.commit_photo(first, decoded(10, 10, 1)).unwrap(),
            PhotoUpdate::Discarded
        );
        assert!(!session.has_photo());
    }

    #[test]
    fn generate_is_gated_on_templates() {
        let session = Session::new(Preset::Bordered, CompositorConfig::default(), None)
            .expect("session init failed");
        let ticket = session.begin_photo_selection();
        session.commit_photo(ticket, decoded(10, 10, 1)).unwrap();

        assert!(matches!(
            session.generate(None),
            Err(ImageError::TemplateUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn missing_template_source_keeps_session_unready() {
        let session = Session::new(Preset::Dual, CompositorConfig::default(), None)
            .expect("session init failed");

        let result = session
            .load_templates(Some(upload("v.png", 10, 10)), None)
            .await;

        assert!(matches!(result, Err(ImageError::TemplateUnavailable(_))));
        assert!(!session.templates_ready());
    }

    #[tokio::test]
    async fn broken_template_keeps_session_unready() {
        let session = Session::new(Preset::Classic, CompositorConfig::default(), None)
            .expect("session init failed");

        let broken = ImageSource::Upload(UploadedFile {
            name: "template.png".into(),
            declared_mime: Some("image/png".into()),
            bytes: b"<html>404</html>".to_vec(),
        });

        assert!(session.load_templates(Some(broken), None).await.is_err());
        assert!(!session.templates_ready());
        assert!(
            session
                .wait_until_ready_timeout(Duration::from_millis(20))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn missing_inputs_are_reported() {
        let session = Session::new(Preset::Classic, CompositorConfig::default(), None)
            .expect("session init failed");
        session
            .load_templates(Some(upload("v.png", 54, 96)), None)
            .await
            .expect("template should load");

        let both = session.generate(Some("   ")).unwrap_err();
        assert!(matches!(&both, ImageError::MissingInput(msg) if msg.contains("姓名") && msg.contains("头像")));

        session.select_photo(upload("me.png", 40, 60)).await.unwrap();
        assert!(matches!(
            session.generate(None),
            Err(ImageError::MissingInput(msg)) if msg == "请输入姓名"
        ));
    }

    #[tokio::test]
    async fn bordered_generate_produces_preview_and_full_for_both_templates() {
        let session = ready_bordered_session().await;
        assert_eq!(
            session.select_photo(upload("me.png", 120, 80)).await.unwrap(),
            PhotoUpdate::Applied
        );

        let frames = session.generate_when_ready(Some("ignored")).await.expect("generate failed");
        assert_eq!(frames.frames.len(), 4);

        let story = frames.get(TemplateKind::Vertical, Resolution::Full).unwrap();
        assert_eq!(story.image.dimensions(), (2160, 3840));
        assert_eq!(story.file_name, "Wireframed2024_story.png");

        let post_preview = frames.get(TemplateKind::Square, Resolution::Preview).unwrap();
        assert_eq!(post_preview.image.dimensions(), (1080, 1080));
        assert_eq!(frames.exports().count(), 2);
        assert_eq!(frames.previews().count(), 2);
    }

    #[tokio::test]
    async fn rejected_upload_clears_current_photo() {
        let session = ready_bordered_session().await;
        session.select_photo(upload("me.png", 50, 50)).await.unwrap();
        assert!(session.has_photo());

        let gif = ImageSource::Upload(UploadedFile {
            name: "me.gif".into(),
            declared_mime: Some("image/gif".into()),
            bytes: b"GIF89a\x01\x00\x01\x00\x00\x00\x00".to_vec(),
        });
        assert!(matches!(
            session.select_photo(gif).await,
            Err(ImageError::InvalidFormat(_))
        ));

        assert!(!session.has_photo());
        assert!(matches!(session.generate(None), Err(ImageError::MissingInput(_))));
    }

    #[tokio::test]
    async fn wait_until_ready_joins_both_signals() {
        let session = Arc::new(ready_bordered_session().await);

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .wait_until_ready_timeout(Duration::from_secs(5))
                    .await
            })
        };

        tokio::task::yield_now().await;
        let ticket = session.begin_photo_selection();
        session.commit_photo(ticket, decoded(32, 32, 7)).unwrap();

        waiter
            .await
            .expect("waiter panicked")
            .expect("both signals should be observed");
    }

    #[tokio::test]
    async fn scaled_templates_are_cached_per_variant() {
        let session = ready_bordered_session().await;
        session.select_photo(upload("me.png", 40, 40)).await.unwrap();

        let first = session.generate(None).expect("generate failed");
        {
            let targets = session.targets.lock().unwrap();
            assert_eq!(targets.len(), 4);
            for (variant, slot) in targets.iter() {
                let placement = variant.placement().unwrap();
                assert_eq!(slot.background.dimensions(), (placement.width, placement.height));
                assert_eq!(slot.filter, FilterType::Lanczos3);
            }
        }

        let second = session.generate(None).expect("generate failed");
        for (a, b) in first.frames.iter().zip(&second.frames) {
            assert_eq!(a.image, b.image);
        }

        session
            .handler()
            .set_smoothing_quality(crate::compositor::SmoothingQuality::Low)
            .expect("switch quality failed");
        session.generate(None).expect("generate failed");
        let targets = session.targets.lock().unwrap();
        assert!(targets.values().all(|slot| slot.filter == FilterType::Triangle));
    }

    #[test]
    fn poisoned_photo_lock_is_an_internal_error() {
        let session = Arc::new(
            Session::new(Preset::Bordered, CompositorConfig::default(), None)
                .expect("session init failed"),
        );
        let poisoner = Arc::clone(&session);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.photo.lock().unwrap();
            panic!("poison the photo lock");
        })
        .join();

        let ticket = session.begin_photo_selection();
        let err = session.commit_photo(ticket, decoded(4, 4, 1)).unwrap_err();
        assert!(matches!(err, ImageError::Internal(_)));
        assert_eq!(err.stage(), "internal");
    }

    #[tokio::test]
    async fn templates_are_loaded_once() {
        let session = ready_bordered_session().await;

        let broken = ImageSource::DataUrl("data:image/png;base64,AAAA".into());
        session
            .load_templates(Some(broken.clone()), Some(broken))
            .await
            .expect("second load should be a no-op");
        assert!(session.templates_ready());
    }
}
