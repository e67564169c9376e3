//
// SMS delivery is an external collaborator: dispatch is fire-and-forget
// and its failure does not roll back the OTP row, which is itself the
// audit trail. This sink only logs; a real deployment swaps it for a
// provider client behind the same function.
//
pub fn dispatch_otp_sms(phone: &str, code: &str) {
    let phone = phone.to_string();
    let code = code.to_string();
    tokio::spawn(async move {
        info!("Dispatching OTP sms to {phone}: your code is {code}");
    });
}
