use crate::capture::CaptureSession;
use crate::client::{ApiClient, UiCommand};
use crate::diagnostics::MetricsCollector;
use crate::display::Renderer;
use crate::error::ErrorSink;
#[cfg(feature = "ui")]
use crate::error::{MSG_QA_REQUIRED, MSG_RESUME_REQUIRED};

#[cfg(feature = "ui")]
use eframe::egui;
#[cfg(feature = "ui")]
use tokio::sync::mpsc::UnboundedSender;

#[cfg(feature = "ui")]
pub struct DashboardApp {
    session: CaptureSession,
    client: ApiClient,
    renderer: Renderer,
    sink: ErrorSink,
    metrics: MetricsCollector,
    cmd_tx: UnboundedSender<UiCommand>,
    job_description: String,
    selected_tab: usize,
    resume_path: String,
    question: String,
    answer: String,
    alert: Option<String>,
    rate_history: Vec<f32>,
    latency_history: Vec<f32>,
}

#[cfg(feature = "ui")]
#[allow(clippy::too_many_arguments)]
pub fn run_dashboard(
    session: CaptureSession,
    client: ApiClient,
    renderer: Renderer,
    sink: ErrorSink,
    metrics: MetricsCollector,
    cmd_tx: UnboundedSender<UiCommand>,
    job_description: String,
) -> anyhow::Result<()> {
    let app = DashboardApp {
        session,
        client,
        renderer,
        sink,
        metrics,
        cmd_tx,
        job_description,
        selected_tab: 0,
        resume_path: String::new(),
        question: String::new(),
        answer: String::new(),
        alert: None,
        rate_history: Vec::new(),
        latency_history: Vec::new(),
    };
    let options = eframe::NativeOptions::default();
    let _ = eframe::run_native(
        "Interview Capture",
        options,
        Box::new(move |_cc| Box::new(app)),
    );
    Ok(())
}

#[cfg(feature = "ui")]
impl DashboardApp {
    fn update_metrics(&mut self) {
        if let Some(snap) = self.metrics.get_latest() {
            if self.rate_history.len() > 60 {
                self.rate_history.remove(0);
            }
            if self.latency_history.len() > 60 {
                self.latency_history.remove(0);
            }
            self.rate_history.push(snap.request_rate_hz.max(0.0));
            self.latency_history.push(snap.last_latency_ms.max(0.0));
        }
    }

    fn send_command(&mut self, cmd: UiCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::warn!("command worker is gone");
        }
    }

    fn region_row(ui: &mut egui::Ui, name: &str, value: &str) {
        ui.horizontal(|ui| {
            ui.label(name);
            if value.is_empty() {
                ui.colored_label(egui::Color32::DARK_GRAY, "--");
            } else {
                ui.label(value);
            }
        });
    }

    /// Minimal sparkline over the last minute of samples. Values above
    /// `max_value` are clipped to the top edge.
    fn sparkline(ui: &mut egui::Ui, label: &str, data: &[f32], color: egui::Color32, max_value: f32) {
        ui.horizontal(|ui| {
            ui.label(label);
            match data.last() {
                Some(last) => ui.strong(format!("{last:.1}")),
                None => ui.colored_label(egui::Color32::DARK_GRAY, "--"),
            };
        });

        let desired = egui::vec2(300.0, 56.0);
        let (rect, _) = ui.allocate_exact_size(desired, egui::Sense::hover());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 3.0, egui::Color32::from_gray(28));

        if data.len() < 2 {
            return;
        }
        let span = max_value.max(f32::EPSILON);
        let dx = rect.width() / (data.len() - 1) as f32;
        let at = |i: usize, v: f32| {
            egui::pos2(
                rect.left() + i as f32 * dx,
                rect.bottom() - (v / span).clamp(0.0, 1.0) * rect.height(),
            )
        };
        for (i, pair) in data.windows(2).enumerate() {
            painter.line_segment(
                [at(i, pair[0]), at(i + 1, pair[1])],
                egui::Stroke::new(1.5, color),
            );
        }
    }
}

#[cfg(feature = "ui")]
impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.update_metrics();
        let regions = self.renderer.snapshot();
        let status = self.client.status_snapshot();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("面试捕捉客户端");

            if self.session.is_active() {
                ui.colored_label(egui::Color32::GREEN, "● CAPTURING");
            } else {
                ui.colored_label(egui::Color32::RED, "● STOPPED");
            }
            ui.separator();

            if let Some(alert) = self.alert.clone() {
                ui.horizontal(|ui| {
                    ui.colored_label(egui::Color32::YELLOW, alert);
                    if ui.button("知道了").clicked() {
                        self.alert = None;
                    }
                });
                ui.separator();
            }

            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.selected_tab, 0, "实时分析");
                ui.selectable_value(&mut self.selected_tab, 1, "简历匹配");
                ui.selectable_value(&mut self.selected_tab, 2, "回答评估");
                ui.selectable_value(&mut self.selected_tab, 3, "综合报告");
                ui.selectable_value(&mut self.selected_tab, 4, "Metrics");
                ui.selectable_value(&mut self.selected_tab, 5, "Errors");
            });
            ui.separator();

            match self.selected_tab {
                0 => {
                    ui.group(|ui| {
                        ui.heading("语音");
                        Self::region_row(ui, "语速:", &regions.speaking_speed);
                        Self::region_row(ui, "停顿次数:", &regions.pause_count);
                        ui.separator();
                        ui.label("转写:");
                        egui::ScrollArea::vertical()
                            .auto_shrink([false, true])
                            .max_height(120.0)
                            .show(ui, |ui| {
                                ui.label(regions.transcript.trim_start());
                            });
                    });
                    ui.group(|ui| {
                        ui.heading("视频");
                        Self::region_row(ui, "人脸:", &regions.face_status);
                        Self::region_row(ui, "紧张程度:", &regions.emotion_tension);
                        Self::region_row(ui, "眼神接触:", &regions.eye_contact);
                        ui.separator();
                        ui.label(format!(
                            "已采集音频块: {}  已采集帧: {}",
                            self.session.chunks_captured(),
                            self.session.frames_captured()
                        ));
                    });
                }
                1 => {
                    ui.group(|ui| {
                        ui.heading("简历匹配");
                        ui.horizontal(|ui| {
                            ui.label("简历文件路径:");
                            ui.text_edit_singleline(&mut self.resume_path);
                        });
                        if ui.button("分析简历").clicked() {
                            if self.resume_path.trim().is_empty() {
                                self.alert = Some(MSG_RESUME_REQUIRED.to_string());
                            } else {
                                let cmd = UiCommand::AnalyzeResume {
                                    path: self.resume_path.trim().into(),
                                    job_description: self.job_description.clone(),
                                };
                                self.send_command(cmd);
                            }
                        }
                        ui.separator();
                        Self::region_row(ui, "匹配分数:", &regions.match_score);
                        ui.label("简历内容:");
                        egui::ScrollArea::vertical()
                            .auto_shrink([false, true])
                            .max_height(160.0)
                            .show(ui, |ui| {
                                ui.label(&regions.resume_text);
                            });
                    });
                }
                2 => {
                    ui.group(|ui| {
                        ui.heading("回答评估");
                        ui.label("面试问题:");
                        ui.text_edit_singleline(&mut self.question);
                        ui.label("你的回答:");
                        ui.text_edit_multiline(&mut self.answer);
                        if ui.button("分析回答").clicked() {
                            if self.question.trim().is_empty() || self.answer.trim().is_empty() {
                                self.alert = Some(MSG_QA_REQUIRED.to_string());
                            } else {
                                let cmd = UiCommand::AnalyzeAnswer {
                                    question: self.question.clone(),
                                    answer: self.answer.clone(),
                                };
                                self.send_command(cmd);
                            }
                        }
                        ui.separator();
                        Self::region_row(ui, "回答结构(STAR):", &regions.star_score);
                        Self::region_row(ui, "专业术语:", &regions.term_score);
                        Self::region_row(ui, "相关性:", &regions.relevance_score);
                        ui.label("反馈:");
                        ui.label(&regions.feedback);
                    });
                }
                3 => {
                    ui.group(|ui| {
                        ui.heading("综合报告");
                        if ui.button("生成报告").clicked() {
                            self.send_command(UiCommand::GenerateReport);
                        }
                        ui.separator();
                        if regions.combined_report.is_empty() {
                            ui.colored_label(egui::Color32::DARK_GRAY, "尚未生成报告");
                        } else {
                            ui.label(&regions.combined_report);
                        }
                    });
                }
                4 => {
                    ui.label("Upload metrics");
                    ui.separator();
                    ui.label(format!(
                        "Sent: {}  OK: {}  Errors: {}",
                        status.requests_sent, status.responses_ok, status.upload_errors
                    ));
                    egui::ScrollArea::vertical()
                        .auto_shrink([false; 2])
                        .show(ui, |ui| {
                            Self::sparkline(
                                ui,
                                "Request rate (Hz)",
                                &self.rate_history,
                                egui::Color32::LIGHT_BLUE,
                                30.0,
                            );
                            ui.add_space(8.0);
                            Self::sparkline(
                                ui,
                                "Last latency (ms)",
                                &self.latency_history,
                                egui::Color32::YELLOW,
                                500.0,
                            );
                        });
                }
                5 => {
                    ui.label(format!("Total errors: {}", self.sink.total_reported()));
                    ui.separator();
                    egui::ScrollArea::vertical()
                        .auto_shrink([false; 2])
                        .show(ui, |ui| {
                            for err in self.sink.recent().iter().rev() {
                                ui.label(format!("[{}] {}", err.at_unix_ms, err.message));
                            }
                        });
                }
                _ => {}
            }
        });

        ctx.request_repaint_after(std::time::Duration::from_millis(500));
    }
}

#[cfg(not(feature = "ui"))]
#[allow(clippy::too_many_arguments)]
pub fn run_dashboard(
    _session: CaptureSession,
    _client: ApiClient,
    _renderer: Renderer,
    _sink: ErrorSink,
    _metrics: MetricsCollector,
    _cmd_tx: tokio::sync::mpsc::UnboundedSender<UiCommand>,
    _job_description: String,
) -> anyhow::Result<()> {
    tracing::info!("Dashboard requires 'ui' feature. Build with: cargo build --features ui");
    Ok(())
}
