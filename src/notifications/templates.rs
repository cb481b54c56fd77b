//! Customer-facing message bodies.

use rust_decimal::{Decimal, RoundingStrategy};

use super::OutgoingEmail;

const SIGNATURE: &str = "- Team Elegance Sarees";
const MAX_LISTED_ITEMS: usize = 3;

/// Formats an amount the way the storefront displays it: thousands separated,
/// at most two decimals, trailing zeros dropped (`1300` → `1,300`).
pub fn format_rupees(amount: Decimal) -> String {
    let rounded = amount
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    let text = rounded.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (text.clone(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Line shown in cart messages
#[derive(Debug, Clone)]
pub struct MessageLine<'a> {
    pub name: &'a str,
    pub price: Decimal,
    pub quantity: i32,
}

/// Immediate notification sent when a tracked cart changes
pub fn cart_notification(customer: &str, item_count: i64, total: Decimal, site_url: &str) -> String {
    format!(
        "Hi {customer}! 🛍️\n\nYou have {item_count} item(s) in your cart worth ₹{total}.\n\n\
         Complete your purchase now to secure these beautiful sarees!\n\n\
         🌟 Free shipping on orders above ₹999\n💝 Easy returns within 7 days\n\n\
         Shop now: {site_url}/cart",
        total = format_rupees(total),
    )
}

/// Item summary passed to the abandonment template: `Name (₹price x qty)` per line
pub fn abandoned_items_list(lines: &[MessageLine<'_>]) -> String {
    lines
        .iter()
        .map(|l| format!("{} (₹{} x {})", l.name, format_rupees(l.price), l.quantity))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text sent through the ad-hoc send-message route after a cart update
pub fn cart_update_message(
    customer: &str,
    lines: &[MessageLine<'_>],
    total: Decimal,
    site_url: &str,
) -> String {
    let listed = lines
        .iter()
        .take(MAX_LISTED_ITEMS)
        .map(|l| format!("• {} (₹{})", l.name, format_rupees(l.price)))
        .collect::<Vec<_>>()
        .join("\n");
    let more = if lines.len() > MAX_LISTED_ITEMS {
        format!("\n...and {} more items", lines.len() - MAX_LISTED_ITEMS)
    } else {
        String::new()
    };

    format!(
        "🛍️ Hi {customer}!\n\nYour cart has been updated with these beautiful sarees:\n\n\
         {listed}{more}\n\n💰 Total: ₹{total}\n\n\
         Complete your purchase now: {site_url}/cart\n\n\
         ✨ Need help? Reply to this message and we'll assist you!\n\n{SIGNATURE}",
        total = format_rupees(total),
    )
}

pub fn abandonment_reminder_message(customer: &str, total: Decimal, site_url: &str) -> String {
    format!(
        "🌟 Hi {customer}!\n\nYou left some gorgeous sarees in your cart. Don't miss out on these beautiful pieces!\n\n\
         🛍️ Cart Total: ₹{total}\n\n🎁 Special offer: Use code SAVE10 for 10% off your order!\n\n\
         Complete your purchase: {site_url}/cart\n\n⏰ This offer expires in 24 hours.\n\n{SIGNATURE}",
        total = format_rupees(total),
    )
}

pub fn order_confirmation_message(
    customer: &str,
    order_id: &str,
    total: Decimal,
    site_url: &str,
) -> String {
    format!(
        "🎉 Thank you {customer}!\n\nYour order has been confirmed:\n📦 Order #{order_id}\n💰 Total: ₹{total}\n\n\
         We'll start preparing your beautiful sarees right away and notify you once they're shipped.\n\n\
         Track your order: {site_url}/account\n\nNeed help? Reply to this message!\n\n{SIGNATURE}",
        total = format_rupees(total),
    )
}

pub fn shipping_update_message(
    customer: &str,
    order_id: &str,
    tracking_number: &str,
    estimated_delivery: &str,
    site_url: &str,
) -> String {
    format!(
        "📦 Great news {customer}!\n\nYour order #{order_id} has been shipped!\n\n\
         🚚 Tracking Number: {tracking_number}\n📅 Estimated Delivery: {estimated_delivery}\n\n\
         Your beautiful sarees are on their way to you!\n\n\
         Track your package: {site_url}/track/{tracking_number}\n\n{SIGNATURE}"
    )
}

/// Sent by the cron job when an unpaid UPI order times out
pub fn auto_cancel_message(customer: &str, order_number: &str, timeout_mins: i64) -> String {
    format!(
        "Hi {customer},\n\nYour order #{order_number} was cancelled because we did not receive \
         payment within {timeout_mins} minutes.\n\nIf you already paid, reply to this message with \
         your UPI transaction id and we'll sort it out.\n\n{SIGNATURE}"
    )
}

/// Escapes text interpolated into HTML mail bodies
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Store identity printed in mail footers
#[derive(Debug, Clone)]
pub struct MailBranding<'a> {
    pub store_name: &'a str,
    pub support_email: &'a str,
    pub site_url: &'a str,
}

/// Invoice line in the order confirmation mail
#[derive(Debug, Clone)]
pub struct InvoiceLine {
    pub name: String,
    pub quantity: i32,
    pub line_total: Decimal,
}

pub struct OrderConfirmationMail<'a> {
    pub to: &'a str,
    pub customer_name: Option<&'a str>,
    pub order_id: &'a str,
    pub order_number: &'a str,
    pub amount: Decimal,
    pub lines: &'a [InvoiceLine],
}

const MAIL_STYLE: &str = "body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }\n\
    .container { max-width: 600px; margin: 0 auto; padding: 20px; }\n\
    .content { background: #f9fafb; padding: 20px; border: 1px solid #e5e7eb; }\n\
    .footer { background: #f9fafb; padding: 15px; text-align: center; font-size: 12px; color: #6b7280; border-top: 1px solid #e5e7eb; }\n\
    .order-summary { background: white; padding: 15px; border-radius: 8px; margin: 15px 0; }\n\
    .item-row { display: flex; justify-content: space-between; padding: 8px 0; border-bottom: 1px solid #e5e7eb; }\n\
    .total { font-weight: bold; font-size: 18px; color: #8B5CF6; }\n\
    .success-badge { background: #10B981; color: white; padding: 10px 20px; border-radius: 20px; display: inline-block; margin: 10px 0; }";

fn wrap_mail(header_color: &str, header: &str, content: &str, brand: &MailBranding<'_>) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n{MAIL_STYLE}\n\
         .header {{ background: {header_color}; color: white; padding: 20px; border-radius: 8px 8px 0 0; }}\n\
         </style>\n</head>\n<body>\n<div class=\"container\">\n<div class=\"header\">{header}</div>\n\
         <div class=\"content\">{content}</div>\n<div class=\"footer\"><p>© {store} | Need help? {support}</p></div>\n\
         </div>\n</body>\n</html>\n",
        store = escape_html(brand.store_name),
        support = escape_html(brand.support_email),
    )
}

pub fn order_confirmation_email(mail: &OrderConfirmationMail<'_>, brand: &MailBranding<'_>) -> OutgoingEmail {
    let order_number = escape_html(mail.order_number);
    let rows: String = mail
        .lines
        .iter()
        .map(|line| {
            format!(
                "<div class=\"item-row\"><span>{} (Qty: {})</span><span>₹{}</span></div>",
                escape_html(&line.name),
                line.quantity,
                format_rupees(line.line_total)
            )
        })
        .collect();

    let content = format!(
        "<p>Hi {name},</p>\
         <p>Thank you for your order! We're preparing your beautiful sarees and will notify you once they ship.</p>\
         <div class=\"order-summary\"><h2>Order Summary</h2>{rows}\
         <div class=\"item-row total\"><span>Total Amount</span><span>₹{amount}</span></div></div>\
         <p><strong>Next Steps:</strong></p><ul>\
         <li>Complete payment via UPI within 30 minutes</li>\
         <li>Upload payment screenshot in your order confirmation page</li>\
         <li>You'll receive WhatsApp updates when your order ships</li></ul>\
         <p>Track your order: <a href=\"{site}/order/confirmation/{order_id}\">View Order</a></p>",
        name = escape_html(mail.customer_name.unwrap_or("Customer")),
        amount = format_rupees(mail.amount),
        site = brand.site_url,
        order_id = escape_html(mail.order_id),
    );

    OutgoingEmail {
        to: mail.to.to_string(),
        subject: format!("Order Confirmation #{} - {}", mail.order_number, brand.store_name),
        html: wrap_mail(
            "#8B5CF6",
            &format!("<h1>Order Confirmation</h1><p>Order #{order_number}</p>"),
            &content,
            brand,
        ),
    }
}

pub fn payment_verified_email(
    to: &str,
    customer_name: Option<&str>,
    order_number: &str,
    amount: Decimal,
    brand: &MailBranding<'_>,
) -> OutgoingEmail {
    let number = escape_html(order_number);
    let content = format!(
        "<p>Hi {name},</p><div class=\"success-badge\">Payment Received Successfully!</div>\
         <p>Great news! We've received your payment of <strong>₹{amount}</strong> for order #{number}.</p>\
         <p><strong>What's Next?</strong></p><ul>\
         <li>We're now preparing your beautiful sarees</li>\
         <li>You'll receive a WhatsApp notification when your order ships</li>\
         <li>Expected delivery: 3-5 business days</li></ul>\
         <p>You can track your order status in your account dashboard.</p>\
         <p>Thank you for shopping with us! 🎉</p>",
        name = escape_html(customer_name.unwrap_or("Customer")),
        amount = format_rupees(amount),
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Payment Verified - Order #{}", order_number),
        html: wrap_mail(
            "#10B981",
            &format!("<h1>✅ Payment Verified</h1><p>Order #{number}</p>"),
            &content,
            brand,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(1300), "1,300")]
    #[case(dec!(999), "999")]
    #[case(dec!(1234567.50), "1,234,567.5")]
    #[case(dec!(4999.999), "5,000")]
    #[case(dec!(0), "0")]
    fn formats_rupee_amounts(#[case] amount: Decimal, #[case] expected: &str) {
        assert_eq!(format_rupees(amount), expected);
    }

    #[test]
    fn cart_update_lists_at_most_three_items() {
        let lines: Vec<MessageLine<'_>> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|name| MessageLine {
                name: *name,
                price: dec!(100),
                quantity: 1,
            })
            .collect();
        let msg = cart_update_message("Priya", &lines, dec!(500), "https://shop.test");
        assert!(msg.contains("• C (₹100)"));
        assert!(!msg.contains("• D"));
        assert!(msg.contains("...and 2 more items"));
        assert!(msg.ends_with(SIGNATURE));
    }

    #[test]
    fn cart_notification_mentions_count_and_link() {
        let msg = cart_notification("Priya", 3, dec!(1300), "https://shop.test");
        assert!(msg.starts_with("Hi Priya! 🛍️"));
        assert!(msg.contains("3 item(s) in your cart worth ₹1,300"));
        assert!(msg.contains("Shop now: https://shop.test/cart"));
    }

    #[test]
    fn confirmation_email_escapes_customer_input() {
        let brand = MailBranding {
            store_name: "Elegance Sarees",
            support_email: "help@example.com",
            site_url: "https://shop.test",
        };
        let lines = vec![InvoiceLine {
            name: "Banarasi <Silk>".into(),
            quantity: 2,
            line_total: dec!(3000),
        }];
        let mail = order_confirmation_email(
            &OrderConfirmationMail {
                to: "a@b.com",
                customer_name: Some("<script>"),
                order_id: "abc",
                order_number: "ORD-1",
                amount: dec!(3000),
                lines: &lines,
            },
            &brand,
        );
        assert_eq!(mail.subject, "Order Confirmation #ORD-1 - Elegance Sarees");
        assert!(mail.html.contains("Banarasi &lt;Silk&gt; (Qty: 2)"));
        assert!(mail.html.contains("Hi &lt;script&gt;,"));
        assert!(mail.html.contains("https://shop.test/order/confirmation/abc"));
    }

    #[test]
    fn payment_verified_subject() {
        let brand = MailBranding {
            store_name: "Elegance Sarees",
            support_email: "help@example.com",
            site_url: "https://shop.test",
        };
        let mail = payment_verified_email("a@b.com", None, "ORD-9", dec!(1299), &brand);
        assert_eq!(mail.subject, "Payment Verified - Order #ORD-9");
        assert!(mail.html.contains("Hi Customer,"));
        assert!(mail.html.contains("₹1,299"));
    }
}
